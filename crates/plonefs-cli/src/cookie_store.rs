//! Session cookies persisted between runs, keyed by site URI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use plonefs_kernel::{CookieJar, RemoteUri};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CookieStore {
    sites: BTreeMap<String, CookieJar>,
}

impl CookieStore {
    /// `$XDG_CACHE_HOME/plonefs/cookies.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("plonefs").join("cookies.json"))
    }

    /// Read the store; a missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read cookies");
                return Self::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed cookie file");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, site: &RemoteUri) -> Option<CookieJar> {
        self.sites.get(&site.to_string()).cloned()
    }

    pub fn insert(&mut self, site: &RemoteUri, jar: CookieJar) {
        if jar.is_empty() {
            self.sites.remove(&site.to_string());
        } else {
            self.sites.insert(site.to_string(), jar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cookies.json");
        let site = RemoteUri::new("example.edu", "/nursing");

        let mut jar = CookieJar::new();
        jar.insert("__ac", "token");
        let mut store = CookieStore::default();
        store.insert(&site, jar.clone());
        store.save(&path).unwrap();

        let loaded = CookieStore::load(&path);
        assert_eq!(loaded.get(&site), Some(jar));
        assert_eq!(loaded.get(&RemoteUri::new("example.edu", "/other")), None);
    }

    #[test]
    fn test_missing_or_malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        assert!(CookieStore::load(&path).sites.is_empty());

        std::fs::write(&path, "not json").unwrap();
        assert!(CookieStore::load(&path).sites.is_empty());
    }

    #[test]
    fn test_empty_jar_is_dropped() {
        let site = RemoteUri::new("h", "/site");
        let mut store = CookieStore::default();
        let mut jar = CookieJar::new();
        jar.insert("__ac", "x");
        store.insert(&site, jar);
        store.insert(&site, CookieJar::new());
        assert!(store.get(&site).is_none());
    }
}
