//! Error types for sessionwatch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    /// The file disappeared between the change event and the read. Callers
    /// treat this as a pending deletion, not a failure.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Not a hook signal file: {}", .0.display())]
    InvalidSignalName(PathBuf),

    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WatchError {
    /// Map an I/O error on `path`, turning `NotFound` into [`WatchError::FileNotFound`].
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            WatchError::FileNotFound(path.to_path_buf())
        } else {
            WatchError::Io(err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WatchError::FileNotFound(_))
    }
}
