/// OpenAPI document for the HTTP surface.
pub mod documentation;
/// Health reporting for the HTTP layer.
pub mod health_service;
/// Experience to rank tier mapping.
pub mod rank;
/// Persisted one-shot rank-up notice.
pub mod rank_notice;
/// Room snapshots as server-sent events.
pub mod room_events;
/// Per-client snapshot driver and end-of-game settlement.
pub mod room_session;
/// Waiting-room membership and room switching.
pub mod room_switch;
/// End-of-game experience computation.
pub mod scoring;
/// Background connection supervision for the room store.
pub mod storage_supervisor;
/// Injectable recorder of room document writes.
pub mod write_monitor;
