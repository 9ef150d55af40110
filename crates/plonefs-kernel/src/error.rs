//! Filesystem error types.

use std::io;
use thiserror::Error;

/// Filesystem error type.
///
/// Every variant carries plain strings so the error is `Clone`: a single
/// in-flight load hands the same outcome to all of its waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// Network or connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Session is not (or no longer) authorized.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No remote object at this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The remote answered, but not the way the operation needed.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl FsError {
    /// Create a Transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an Unauthorized error.
    pub fn unauthorized(path: impl Into<String>) -> Self {
        Self::Unauthorized(path.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an Unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// An operation the engine deliberately does not implement.
    pub fn unsupported(operation: &str) -> Self {
        Self::Unavailable(format!("{operation} is not supported"))
    }

    /// A response with an unexpected HTTP status.
    pub fn unexpected_status(status: u16, what: &str) -> Self {
        Self::Unavailable(format!("{what}: unexpected status {status}"))
    }

    /// Returns true for the session-expired kind.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for FsError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for FsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unavailable(format!("malformed JSON response: {e}"))
    }
}

/// Convert FsError to std::io::Error for hosts that speak io errors.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Transport(msg) => io::Error::new(io::ErrorKind::ConnectionAborted, msg),
            FsError::Unauthorized(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            FsError::Unavailable(msg) => io::Error::other(msg),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
