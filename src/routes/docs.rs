use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Where the generated OpenAPI document is served.
pub const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI for the observation API, mounted at `/docs`.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::<SharedState>::from(SwaggerUi::new("/docs").url(OPENAPI_PATH, ApiDoc::openapi()))
        .with_state(state)
}
