//! Error types for the engine.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] amprack_core::Error),

    #[error("Failed to load {}: {reason}", path.display())]
    LoadFailed { path: PathBuf, reason: String },

    #[error("Resource is not runnable after configuration: {0}")]
    NotRunnable(PathBuf),

    #[error("Unknown slot: {0}")]
    UnknownSlot(u8),
}

impl Error {
    pub fn load_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
