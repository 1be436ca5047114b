use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    dto::room::RoomView, error::AppError, services::room_events, state::SharedState,
};

/// Read-only room observation routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{room_id}", get(get_room))
        .route("/rooms/{room_id}/events", get(room_events))
}

#[utoipa::path(
    get,
    path = "/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Current room snapshot", body = RoomView),
        (status = 404, description = "Unknown room"),
        (status = 503, description = "Room store unavailable")
    )
)]
/// Latest snapshot of a room.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomView>, AppError> {
    let store = state.require_room_store().await?;
    let room = store
        .read(&room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("room `{room_id}`")))?;
    Ok(Json(RoomView::from(&room)))
}

#[utoipa::path(
    get,
    path = "/rooms/{room_id}/events",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "SSE stream of `room` events carrying RoomView payloads", content_type = "text/event-stream", body = String),
        (status = 503, description = "Room store unavailable")
    )
)]
/// Stream every snapshot of a room, starting with the current one.
pub async fn room_events(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let store = state.require_room_store().await?;
    let subscription = store.subscribe(&room_id).await?;
    info!(room_id = %room_id, "new room SSE connection");
    Ok(room_events::to_sse_stream(subscription, room_id))
}
