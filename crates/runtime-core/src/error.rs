//! Error types for the lock-step training runtime

use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the training runtime
#[derive(Error, Debug)]
pub enum Error {
    // Bootstrap errors
    #[error("Process group initialization failed: {message}")]
    ProcessGroupInit { message: String },

    // Checkpoint errors
    #[error("Checkpoint corrupted at {path}: {reason}")]
    CheckpointCorrupted { path: String, reason: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Compute errors surfaced by the engine (numerical overflow, device fault)
    #[error("Compute engine error: {message}")]
    Compute { message: String },

    // Data pipeline errors
    #[error("Data pipeline exhausted at epoch {epoch}, batch {index}")]
    DataExhausted { epoch: u64, index: u64 },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error is fatal and the run cannot resume from it
    /// without operator intervention.
    ///
    /// Everything else terminates the worker too, but the next launch can
    /// recover from the last checkpoint.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ProcessGroupInit { .. }
                | Error::CheckpointCorrupted { .. }
                | Error::InvalidConfig { .. }
                | Error::Internal { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
