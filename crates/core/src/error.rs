// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while tailing a session log.
///
/// All of these are non-fatal: the tailer reports them and keeps watching.
/// The next change notification for the same file retries naturally.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("Session log not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading session log: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("File watcher error: {0}")]
    Watcher(String),
}

impl TailError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// Path of the file the error relates to, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path }
            | Self::Io { path, .. }
            | Self::RootNotFound { path } => Some(path),
            Self::Watcher(_) => None,
        }
    }
}
