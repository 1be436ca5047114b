use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by room store backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or answered with an unexpected failure.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The room document does not exist (never created or deleted meanwhile).
    #[error("room `{room_id}` not found")]
    NotFound { room_id: String },
    /// The committed document no longer matches the expected prior state.
    #[error("precondition failed for room `{room_id}`")]
    PreconditionFailed { room_id: String },
    /// A room with the same identifier has already been created.
    #[error("room `{room_id}` already exists")]
    AlreadyExists { room_id: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    pub(crate) fn not_found(room_id: &str) -> Self {
        StorageError::NotFound {
            room_id: room_id.to_owned(),
        }
    }

    pub(crate) fn precondition_failed(room_id: &str) -> Self {
        StorageError::PreconditionFailed {
            room_id: room_id.to_owned(),
        }
    }
}
