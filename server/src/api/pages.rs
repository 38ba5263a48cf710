use axum::extract::{Path, State};
use axum::Json;
use imgseo_core::types::{ErrorBody, PageImage, PageImagesResponse};
use utoipa::OpenApi;

use super::ApiError;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/pages/{page_id}/images",
    tag = "pages",
    params(
        ("page_id" = u64, Path, description = "Page ID")
    ),
    responses(
        (status = 200, description = "Media-library images referenced by the page", body = PageImagesResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Page not found", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn page_images(
    State(state): State<AppState>,
    Path(page_id): Path<u64>,
) -> Result<Json<PageImagesResponse>, ApiError> {
    Ok(Json(state.service.analyze_page(page_id)?))
}

#[derive(OpenApi)]
#[openapi(
    paths(page_images),
    components(schemas(PageImage, PageImagesResponse))
)]
pub struct ApiDoc;
