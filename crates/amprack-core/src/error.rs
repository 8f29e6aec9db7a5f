//! Error types for amprack-core.

use thiserror::Error;

/// Error type for amprack-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("Worker '{0}' is running")]
    WorkerRunning(String),

    #[error("Thread priority: {0}")]
    Priority(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
