//! Core filesystem types.
//!
//! Identities are immutable: a rename produces a new [`Identity`] (and a new
//! entry) rather than editing a URI in place, so derived fields never go
//! stale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use strum::{Display, EnumString};

use crate::error::{FsError, FsResult};

/// Remote object address: authority (host[:port]) plus absolute path.
///
/// Paths always start with `/` and never end with one (except the
/// authority root, which is `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteUri {
    authority: String,
    path: String,
}

impl RemoteUri {
    /// Create a URI, normalizing slashes in `path`.
    pub fn new(authority: impl Into<String>, path: &str) -> Self {
        Self {
            authority: authority.into(),
            path: normalize_path(path),
        }
    }

    /// Parse `scheme://authority/path[?query]`. The query is dropped.
    pub fn parse(value: &str) -> FsResult<Self> {
        let url = url::Url::parse(value)
            .map_err(|e| FsError::not_found(format!("{value}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| FsError::not_found(format!("{value}: missing host")))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self::new(authority, url.path()))
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Child URI.
    pub fn join(&self, name: &str) -> Self {
        if self.path == "/" {
            Self::new(self.authority.clone(), &format!("/{name}"))
        } else {
            Self::new(self.authority.clone(), &format!("{}/{name}", self.path))
        }
    }

    /// Same authority, different path.
    pub fn with_path(&self, path: &str) -> Self {
        Self::new(self.authority.clone(), path)
    }

    /// Returns true if `other` is this URI or lies below it.
    pub fn contains(&self, other: &RemoteUri) -> bool {
        if self.authority != other.authority {
            return false;
        }
        self.path == "/"
            || other.path == self.path
            || other.path.starts_with(&format!("{}/", self.path))
    }

    /// Path of `other` relative to this URI, if it lies below it.
    pub fn relative<'a>(&self, other: &'a RemoteUri) -> Option<&'a str> {
        if !self.contains(other) {
            return None;
        }
        if self.path == "/" {
            return Some(other.path.trim_start_matches('/'));
        }
        Some(other.path[self.path.len()..].trim_start_matches('/'))
    }
}

impl fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plone://{}{}", self.authority, self.path)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        let joined: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        format!("/{}", joined.join("/"))
    }
}

/// Immutable identity of an entry: its URI and the fields derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    uri: RemoteUri,
    parent_path: String,
    name: String,
}

impl Identity {
    pub fn new(uri: RemoteUri) -> Self {
        let path = uri.path();
        let (parent_path, name) = match path.rfind('/') {
            Some(0) => ("/".to_string(), path[1..].to_string()),
            Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
            None => ("/".to_string(), path.to_string()),
        };
        Self {
            uri,
            parent_path,
            name,
        }
    }

    pub fn uri(&self) -> &RemoteUri {
        &self.uri
    }

    /// Path of the parent object.
    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    /// Base name (the CMS id).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the object.
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Coarse file type, as a host filesystem sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Remote object kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Folder,
    Document,
    Page,
    File,
    Portlet,
    PortletManager,
    LocalCss,
}

impl EntryKind {
    pub fn file_type(&self) -> FileType {
        match self {
            EntryKind::Folder | EntryKind::PortletManager => FileType::Directory,
            _ => FileType::File,
        }
    }

    /// `type_name` the CMS expects in `createObject`, for creatable kinds.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            EntryKind::Folder => Some("Folder"),
            EntryKind::Document | EntryKind::Page => Some("Document"),
            EntryKind::File => Some("File"),
            _ => None,
        }
    }
}

/// Entry metadata returned by `stat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStat {
    pub kind: EntryKind,
    /// Size in bytes (zero until loaded).
    pub size: u64,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    pub title: String,
    pub description: String,
    /// Remote object confirmed present.
    pub exists: bool,
}

impl FileStat {
    pub fn file_type(&self) -> FileType {
        self.kind.file_type()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn file_type(&self) -> FileType {
        self.kind.file_type()
    }
}

/// Flags for `write_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Create the file if it does not exist.
    pub create: bool,
    /// With `create`, replace an existing file instead of failing.
    pub overwrite: bool,
}

impl WriteOptions {
    /// Only update an existing file.
    pub fn update() -> Self {
        Self::default()
    }

    /// Create if missing, replace if present.
    pub fn create_or_replace() -> Self {
        Self {
            create: true,
            overwrite: true,
        }
    }

    /// Create, failing if the name is taken.
    pub fn create_new() -> Self {
        Self {
            create: true,
            overwrite: false,
        }
    }
}

/// Flags for `rename`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenameOptions {
    pub overwrite: bool,
}

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub uri: RemoteUri,
}

impl ChangeEvent {
    pub fn created(uri: RemoteUri) -> Self {
        Self {
            kind: ChangeKind::Created,
            uri,
        }
    }

    pub fn changed(uri: RemoteUri) -> Self {
        Self {
            kind: ChangeKind::Changed,
            uri,
        }
    }

    pub fn deleted(uri: RemoteUri) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_parse_and_normalize() {
        let uri = RemoteUri::parse("https://louisville.edu/nursing/").unwrap();
        assert_eq!(uri.authority(), "louisville.edu");
        assert_eq!(uri.path(), "/nursing");

        let uri = RemoteUri::parse("plone://localhost:8080/Plone/a?localCss").unwrap();
        assert_eq!(uri.authority(), "localhost:8080");
        assert_eq!(uri.path(), "/Plone/a");

        assert_eq!(RemoteUri::new("h", "").path(), "/");
        assert_eq!(RemoteUri::new("h", "//a//b/").path(), "/a/b");
    }

    #[test]
    fn test_uri_join_and_relative() {
        let root = RemoteUri::new("h", "/site");
        let child = root.join("folder").join("page");
        assert_eq!(child.path(), "/site/folder/page");
        assert!(root.contains(&child));
        assert_eq!(root.relative(&child), Some("folder/page"));
        assert_eq!(root.relative(&root), Some(""));

        let other = RemoteUri::new("h", "/site2/page");
        assert!(!root.contains(&other));

        let authority_root = RemoteUri::new("h", "/");
        assert_eq!(authority_root.join("a").path(), "/a");
        assert_eq!(authority_root.relative(&child), Some("site/folder/page"));
    }

    #[test]
    fn test_identity_derived_fields() {
        let id = Identity::new(RemoteUri::new("h", "/site/folder/report.doc"));
        assert_eq!(id.name(), "report.doc");
        assert_eq!(id.parent_path(), "/site/folder");

        let top = Identity::new(RemoteUri::new("h", "/site"));
        assert_eq!(top.name(), "site");
        assert_eq!(top.parent_path(), "/");
    }

    #[test]
    fn test_entry_kind() {
        assert!(EntryKind::Folder.file_type().is_dir());
        assert!(EntryKind::PortletManager.file_type().is_dir());
        assert!(EntryKind::LocalCss.file_type().is_file());
        assert_eq!(EntryKind::Page.type_name(), Some("Document"));
        assert_eq!(EntryKind::Portlet.type_name(), None);
        assert_eq!(EntryKind::LocalCss.to_string(), "local_css");
    }

    #[test]
    fn test_write_options() {
        let create = WriteOptions::create_new();
        assert!(create.create);
        assert!(!create.overwrite);
        assert!(!WriteOptions::update().create);
    }
}
