pub mod images;
pub mod pages;
pub mod ping;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use imgseo_core::error::ErrorCode;
use imgseo_core::service::ServiceError;
use imgseo_core::types::{ErrorBody, ErrorData};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::OpenApi;

use crate::{auth, AppState};

/// Endpoint failure, rendered as an [`ErrorBody`] with the status it carries.
///
/// `returned_empty` carries 200: the call worked, the model just had
/// nothing to say.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::new(
            ErrorCode::InvalidRequest,
            400,
            rejection.body_text(),
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_body())).into_response()
    }
}

/// All routes. Everything under `/api/v1` except ping requires the token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/generate", post(images::generate))
        .route(
            "/api/v1/update",
            post(images::update).put(images::update).patch(images::update),
        )
        .route("/api/v1/pages/{page_id}/images", get(pages::page_images))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .route("/api/v1/ping", get(ping::ping))
        .merge(protected)
        .with_state(state)
}

/// Generate the complete OpenAPI spec by merging all module specs
pub fn openapi() -> utoipa::openapi::OpenApi {
    #[derive(OpenApi)]
    #[openapi(components(schemas(ErrorBody, ErrorData, ErrorCode)))]
    struct BaseApi;

    let mut spec = BaseApi::openapi();

    if let Some(components) = spec.components.as_mut() {
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }

    let modules: Vec<utoipa::openapi::OpenApi> = vec![
        images::ApiDoc::openapi(),
        pages::ApiDoc::openapi(),
        ping::ApiDoc::openapi(),
    ];

    for module_spec in modules {
        spec.paths.paths.extend(module_spec.paths.paths);

        if let Some(module_components) = module_spec.components {
            if let Some(spec_components) = spec.components.as_mut() {
                spec_components.schemas.extend(module_components.schemas);
            }
        }
    }

    spec
}
