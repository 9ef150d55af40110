//! plonefs command-line front end.
//!
//! Registers every site from the config file, runs one filesystem command
//! against it and exits. Paths are full site URLs:
//!
//!   plonefs ls https://example.edu/nursing
//!   plonefs cat https://example.edu/nursing/about
//!   plonefs put --create https://example.edu/nursing/news-page < page.html
//!   plonefs cat 'https://example.edu/nursing?localCss'
//!   plonefs state https://example.edu/nursing/about publish_externally
//!
//! The password is read from `PLONEFS_PASSWORD` unless the site's config
//! entry carries one. Logs go to stderr (`RUST_LOG`, default `info`).

mod commands;
mod cookie_store;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use plonefs_kernel::config::PASSWORD_ENV;
use plonefs_kernel::{Config, HttpTransport, PloneFs, StaticCredentials, WorkflowAction};

use cookie_store::CookieStore;

/// Browse and edit Plone sites as a filesystem.
#[derive(Parser, Debug)]
#[command(name = "plonefs")]
#[command(about = "Browse and edit Plone sites as a filesystem")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/plonefs/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not read or write the persisted session cookies
    #[arg(long, global = true)]
    no_cookies: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a folder or portlet manager
    Ls { path: String },

    /// Show metadata as JSON
    Stat { path: String },

    /// Print file content
    Cat { path: String },

    /// Write content from a file or stdin
    Put {
        path: String,
        /// Read content from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Create the object if it does not exist
        #[arg(long)]
        create: bool,
        /// With --create, replace an existing object
        #[arg(long)]
        overwrite: bool,
    },

    /// Rename or move
    Mv {
        from: String,
        to: String,
        #[arg(long)]
        overwrite: bool,
    },

    /// Copy through the site clipboard
    Cp { from: String, to: String },

    /// Create a folder
    Mkdir { path: String },

    /// Show the workflow state, or apply an action
    State {
        path: String,
        action: Option<WorkflowAction>,
    },

    /// Check a page out into a working copy
    Checkout { path: String },

    /// Check a working copy back in
    Checkin {
        path: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Discard a working copy
    CancelCheckout { path: String },

    /// Fetch a file's raw bytes
    Download {
        path: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path().context("no config directory on this platform")?,
    };
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if config.sites.is_empty() {
        bail!("no sites configured in {}", config_path.display());
    }

    let cookie_path = if args.no_cookies {
        None
    } else {
        CookieStore::default_path()
    };
    let mut cookies = cookie_path
        .as_deref()
        .map(CookieStore::load)
        .unwrap_or_default();

    let fs = PloneFs::new(config.debounce());
    let env_password = std::env::var(PASSWORD_ENV).ok();
    for site in &config.sites {
        let uri = site.uri()?;
        let credentials = site.credentials(env_password.as_deref())?;
        let transport = HttpTransport::with_scheme(site.scheme(), config.timeout())?;
        let registered = fs.register(
            uri.clone(),
            site.features(),
            Arc::new(transport),
            Arc::new(StaticCredentials(credentials)),
        );
        if let Some(jar) = cookies.get(&uri) {
            registered.session().restore_cookies(jar);
        }
        tracing::debug!(site = %uri, user = %site.username, "registered site");
    }

    let result = commands::run(&fs, args.command).await;

    if let Some(path) = &cookie_path {
        for uri in fs.registry().list() {
            if let Some(site) = fs.registry().get(&uri) {
                cookies.insert(&uri, site.session().cookies());
            }
        }
        if let Err(e) = cookies.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "could not persist cookies");
        }
    }
    result
}
