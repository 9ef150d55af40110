//! `plonefs.toml` configuration.
//!
//! ```toml
//! debounce_ms = 5
//! timeout_secs = 30
//!
//! [[sites]]
//! url = "https://example.edu/nursing"
//! username = "editor"
//! portlets = true
//! local_css = true
//! ```
//!
//! Passwords normally come from `PLONEFS_PASSWORD`; a per-site `password`
//! key takes precedence when present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::entry::SiteFeatures;
use crate::notify::DEFAULT_DEBOUNCE;
use crate::session::Credentials;
use crate::types::RemoteUri;

/// Environment variable consulted for site passwords.
pub const PASSWORD_ENV: &str = "PLONEFS_PASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("site {url}: {reason}")]
    Site { url: String, reason: String },

    #[error("no password for {0}: set {PASSWORD_ENV} or the site's password key")]
    MissingPassword(String),
}

/// One site to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub portlets: bool,
    #[serde(default)]
    pub local_css: bool,
}

impl SiteConfig {
    /// Site root URI (the scheme is dropped).
    pub fn uri(&self) -> Result<RemoteUri, ConfigError> {
        RemoteUri::parse(&self.url).map_err(|e| ConfigError::Site {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// `http` or `https`, taken from the URL.
    pub fn scheme(&self) -> &str {
        match self.url.split_once("://") {
            Some(("http", _)) => "http",
            _ => "https",
        }
    }

    pub fn features(&self) -> SiteFeatures {
        SiteFeatures {
            portlets: self.portlets,
            local_css: self.local_css,
        }
    }

    /// Credentials, with the password from the config or `env_password`.
    pub fn credentials(&self, env_password: Option<&str>) -> Result<Credentials, ConfigError> {
        let password = self
            .password
            .as_deref()
            .or(env_password)
            .ok_or_else(|| ConfigError::MissingPassword(self.url.clone()))?;
        Ok(Credentials::new(self.username.as_str(), password))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Change-notification coalescing window in milliseconds.
    ///
    /// Defaults to 5, which merges the events of one save. Hosts that
    /// rescan on every batch may want a window in the tens of
    /// milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            timeout_secs: default_timeout_secs(),
            sites: Vec::new(),
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/plonefs/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("plonefs").join("config.toml"))
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        for site in &config.sites {
            site.uri()?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
