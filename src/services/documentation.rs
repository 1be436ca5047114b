use utoipa::OpenApi;

#[derive(OpenApi)]
/// OpenAPI description of the observation API.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::get_room,
        crate::routes::rooms::room_events,
        crate::routes::monitor::start,
        crate::routes::monitor::stop,
        crate::routes::monitor::export,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::RoomView,
            crate::dto::room::RankingEntry,
            crate::dao::models::CurrentState,
            crate::dao::models::RoomStatus,
            crate::dao::models::AnswerStatus,
            crate::services::write_monitor::WriteReport,
            crate::services::write_monitor::WriteRecord,
            crate::services::write_monitor::RoomWriteTotals,
            crate::services::write_monitor::WriteOperation,
            crate::services::write_monitor::WriteOutcome,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Read-only room snapshots and streams"),
        (name = "monitor", description = "Room write recording"),
    )
)]
pub struct ApiDoc;
