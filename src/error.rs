use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Errors produced by the room engine and the services built on it.
///
/// None of these is fatal: `Stale` and `NotFound` are absorbed as no-ops by callers,
/// `StoreUnavailable` is logged and left to the next natural trigger.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A guarded precondition no longer held when the write reached the store.
    #[error("room state moved on before the write was applied")]
    Stale,
    /// The room document vanished or never existed.
    #[error("room `{0}` not found")]
    NotFound(String),
    /// Transient failure talking to the store.
    #[error("room store unavailable")]
    StoreUnavailable(#[source] StorageError),
    /// The request does not make sense for the room as it stands.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PreconditionFailed { .. } => EngineError::Stale,
            StorageError::NotFound { room_id } => EngineError::NotFound(room_id),
            StorageError::AlreadyExists { room_id } => {
                EngineError::InvalidState(format!("room `{room_id}` already exists"))
            }
            other @ StorageError::Unavailable { .. } => EngineError::StoreUnavailable(other),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Stale => AppError::Conflict("room state moved on".into()),
            EngineError::NotFound(room_id) => AppError::NotFound(format!("room `{room_id}`")),
            EngineError::StoreUnavailable(source) => {
                AppError::ServiceUnavailable(source.to_string())
            }
            EngineError::InvalidState(message) => AppError::Conflict(message),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        EngineError::from(err).into()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_onto_engine_taxonomy() {
        let stale: EngineError = StorageError::PreconditionFailed {
            room_id: "r".into(),
        }
        .into();
        assert!(matches!(stale, EngineError::Stale));

        let missing: EngineError = StorageError::NotFound {
            room_id: "r".into(),
        }
        .into();
        assert!(matches!(missing, EngineError::NotFound(id) if id == "r"));

        let io = std::io::Error::other("boom");
        let down: EngineError = StorageError::unavailable("read".into(), io).into();
        assert!(matches!(down, EngineError::StoreUnavailable(_)));
    }

    #[test]
    fn app_errors_pick_matching_status() {
        let response = AppError::NotFound("room".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = AppError::from(EngineError::Stale).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
