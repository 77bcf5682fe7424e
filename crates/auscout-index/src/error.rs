//! Index error type

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index file not found: {0}")]
    NotFound(PathBuf),

    #[error("corrupt index file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("permission denied on index file: {0}")]
    Permission(PathBuf),

    #[error("I/O error on index file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("index capacity exceeded: {0}")]
    Capacity(String),
}

impl IndexError {
    pub(crate) fn io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => IndexError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => IndexError::Permission(path.to_path_buf()),
            _ => IndexError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
