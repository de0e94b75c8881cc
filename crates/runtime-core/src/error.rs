//! Error types for checkpoint storage resolution and I/O

use thiserror::Error;

use crate::types::StorageRole;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by the storage and checkpoint crates
#[derive(Error, Debug)]
pub enum Error {
    // Resolution errors
    #[error("Checkpoint identifier must be specified when no explicit storage {role} is given")]
    MissingCheckpointId { role: StorageRole },

    #[error(
        "No storage backend recognizes checkpoint identifier {checkpoint_id:?}; \
         specify the storage {role} explicitly"
    )]
    UnrecognizedCheckpointId {
        checkpoint_id: String,
        role: StorageRole,
    },

    // Checkpoint errors
    #[error("Checkpoint not found: {checkpoint_id}")]
    CheckpointNotFound { checkpoint_id: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage backend not available: {backend}")]
    StorageUnavailable { backend: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::StorageUnavailable { .. })
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingCheckpointId { .. }
                | Error::UnrecognizedCheckpointId { .. }
                | Error::InvalidConfig { .. }
                | Error::Internal { .. }
        )
    }

    /// Returns true if the caller failed to say where the checkpoint lives
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::MissingCheckpointId { .. })
    }

    /// Returns true if no backend could be selected for an identifier
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, Error::UnrecognizedCheckpointId { .. })
    }

    /// Returns a retry delay hint in milliseconds, if applicable
    pub fn retry_delay_hint_ms(&self) -> Option<u64> {
        match self {
            Error::Storage { .. } => Some(100),
            Error::StorageUnavailable { .. } => Some(5000),
            _ => None,
        }
    }
}
