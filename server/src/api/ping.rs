use axum::extract::State;
use axum::Json;
use imgseo_core::types::PingResponse;
use utoipa::OpenApi;

use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/ping",
    tag = "health",
    responses(
        (status = 200, description = "Server is up", body = PingResponse)
    )
)]
pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    Json(PingResponse {
        message: "pong".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        key_configured: state.service.provider().is_some(),
    })
}

#[derive(OpenApi)]
#[openapi(paths(ping), components(schemas(PingResponse)))]
pub struct ApiDoc;
