use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod monitor;
pub mod rooms;

/// Compose all route trees and wire in shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(rooms::router())
        .merge(monitor::router())
        .merge(docs::router(state.clone()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::RoomDocument,
            room_store::{MemoryRoomStore, RoomStore},
        },
        state::AppState,
    };

    async fn get(app: Router<()>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn degraded_service_answers_503_for_rooms() {
        let state = AppState::new(AppConfig::default());
        let app = router(state);

        let (status, body) = get(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");

        let (status, _) = get(app, "/rooms/room-1").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn room_snapshot_is_served() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryRoomStore::new();
        store
            .create(RoomDocument::new("room-1", "science"))
            .await
            .unwrap();
        state.install_room_store(std::sync::Arc::new(store)).await;
        let app = router(state);

        let (status, body) = get(app.clone(), "/rooms/room-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roomId"], "room-1");
        assert_eq!(body["status"], "waiting");

        let (status, _) = get(app, "/rooms/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn openapi_document_lists_room_routes() {
        let app = router(AppState::new(AppConfig::default()));

        let (status, body) = get(app, docs::OPENAPI_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/rooms/{room_id}"].is_object());
        assert!(body["paths"]["/monitor/writes"].is_object());
    }
}
