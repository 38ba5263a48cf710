use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use imgseo_core::types::{
    ErrorBody, GenerateRequest, GeneratedMeta, UpdateRequest, UpdateResponse,
};
use utoipa::OpenApi;

use super::ApiError;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/v1/generate",
    tag = "images",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Generated title and alt text, or a returned_empty error body", body = GeneratedMeta),
        (status = 400, description = "Invalid request, missing API key or blocked content", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Image not editable", body = ErrorBody),
        (status = 404, description = "Image not found", body = ErrorBody),
        (status = 500, description = "File access or AI response failure", body = ErrorBody),
        (status = 503, description = "AI service unreachable", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GeneratedMeta>, ApiError> {
    let Json(request) = payload?;
    let meta = state.service.generate(&request).await?;
    Ok(Json(meta))
}

#[utoipa::path(
    method(post, put, patch),
    path = "/api/v1/update",
    tag = "images",
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "Metadata saved", body = UpdateResponse),
        (status = 400, description = "Nothing to update", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Image not editable", body = ErrorBody),
        (status = 404, description = "Image not found", body = ErrorBody),
        (status = 500, description = "One or more fields failed to update", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update(
    State(state): State<AppState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state.service.update(&request)?;
    Ok(Json(response))
}

#[derive(OpenApi)]
#[openapi(
    paths(generate, update),
    components(schemas(GenerateRequest, GeneratedMeta, UpdateRequest, UpdateResponse))
)]
pub struct ApiDoc;
