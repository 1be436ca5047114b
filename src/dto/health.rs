use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by `/health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when a room store is installed and answering, "degraded" otherwise.
    pub status: String,
}

impl HealthResponse {
    /// Room store reachable.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// No room store, or it failed its last health check.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
        }
    }
}
