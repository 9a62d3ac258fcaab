//! Error types for the training worker recording subsystem

use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for lifecycle recording and worker setup
#[derive(Error, Debug)]
pub enum Error {
    // Remote authority errors
    #[error("Master rejected {method} {endpoint}: {response}")]
    RemoteWrite {
        method: String,
        endpoint: String,
        response: String,
    },

    #[error("Record in invalid state: expected {expected}, got {actual}")]
    InvalidRecordState { expected: String, actual: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    #[error("Storage slot already released: {storage_id}")]
    SlotAlreadyReleased { storage_id: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Hyperparameter not found: {name}")]
    HyperparameterNotFound { name: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Scope teardown failed after the scope body already failed
    #[error("Teardown failed: {teardown} (while handling: {cause})")]
    Teardown {
        cause: Box<Error>,
        teardown: Box<Error>,
    },
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RemoteWrite { .. } | Error::Storage { .. } | Error::Io(_) => true,
            Error::Teardown { teardown, .. } => teardown.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig { .. }
                | Error::HyperparameterNotFound { .. }
                | Error::Serialization(_)
                | Error::InvalidRecordState { .. }
        )
    }

    /// Returns true if this is the benign outcome of releasing an
    /// already-released storage slot
    pub fn is_nothing_to_release(&self) -> bool {
        matches!(self, Error::SlotAlreadyReleased { .. })
    }

    /// Combine a scope failure with a failure raised while tearing the scope down
    pub fn teardown(cause: Error, teardown: Error) -> Self {
        Error::Teardown {
            cause: Box::new(cause),
            teardown: Box::new(teardown),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
