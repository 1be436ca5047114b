use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::{services::write_monitor::WriteReport, state::SharedState};

/// Write-monitor lifecycle and export.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/monitor/start", post(start))
        .route("/monitor/stop", post(stop))
        .route("/monitor/writes", get(export))
}

#[utoipa::path(
    post,
    path = "/monitor/start",
    tag = "monitor",
    responses((status = 204, description = "Recording started; earlier records discarded"))
)]
/// Start a fresh recording session.
pub async fn start(State(state): State<SharedState>) -> StatusCode {
    state.monitor().start();
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/monitor/stop",
    tag = "monitor",
    responses((status = 200, description = "Recording stopped", body = WriteReport))
)]
/// Stop recording and return what was captured.
pub async fn stop(State(state): State<SharedState>) -> Json<WriteReport> {
    state.monitor().stop();
    Json(state.monitor().export())
}

#[utoipa::path(
    get,
    path = "/monitor/writes",
    tag = "monitor",
    responses((status = 200, description = "Writes captured so far", body = WriteReport))
)]
pub async fn export(State(state): State<SharedState>) -> Json<WriteReport> {
    Json(state.monitor().export())
}
