//! Host-facing filesystem operations.
//!
//! Paths are URI strings, `scheme://authority/path`, optionally carrying the
//! `?localCss` marker. The scheme is ignored: routing goes by authority and
//! path to the registered site.

use async_trait::async_trait;

use crate::error::FsResult;
use crate::types::{DirEntry, FileStat, RemoteUri, RenameOptions, WriteOptions};

/// Core filesystem operations trait.
///
/// Every mutation either succeeds with the local tree updated to match the
/// remote, or fails without touching it.
#[async_trait]
pub trait FsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get entry metadata.
    async fn stat(&self, uri: &str) -> FsResult<FileStat>;

    /// List a folder or portlet manager.
    async fn read_dir(&self, uri: &str) -> FsResult<Vec<DirEntry>>;

    /// Read file contents, loading them on first access.
    async fn read_file(&self, uri: &str) -> FsResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Replace file contents, creating the file when `options.create` allows.
    ///
    /// New names with an extension become files; extensionless names become
    /// pages; inside a portlet manager the name becomes a new portlet's
    /// header.
    async fn write_file(&self, uri: &str, content: &[u8], options: WriteOptions) -> FsResult<()>;

    /// Rename within a folder, or move across folders.
    async fn rename(&self, from: &str, to: &str, options: RenameOptions) -> FsResult<()>;

    /// Copy through the CMS clipboard. Returns where the copy landed, which
    /// is a `copy_of_` name when the requested one is taken.
    async fn copy(&self, from: &str, to: &str) -> FsResult<RemoteUri>;

    /// Create a folder.
    async fn create_directory(&self, uri: &str) -> FsResult<()>;

    /// Always fails: deleting remote content is not supported.
    async fn delete(&self, uri: &str) -> FsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, uri: &str) -> bool {
        self.stat(uri).await.is_ok()
    }
}
