use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use imgseo_core::error::ErrorCode;
use imgseo_core::service::ServiceError;

use crate::api::ApiError;
use crate::AppState;

fn forbidden(message: &str) -> Response {
    ApiError(ServiceError::new(ErrorCode::Forbidden, 401, message)).into_response()
}

/// Middleware that requires the configured bearer token.
/// Requests pass through unchecked when no token is configured.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };

    let auth_header = match request.headers().get(header::AUTHORIZATION) {
        Some(h) => h,
        None => return forbidden("Missing Authorization header"),
    };

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(_) => return forbidden("Invalid Authorization header"),
    };

    let token = match auth_str.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return forbidden("Invalid Authorization header format"),
    };

    if token != expected {
        tracing::warn!(path = %request.uri().path(), "rejected request with invalid token");
        return forbidden("Invalid API token");
    }

    next.run(request).await
}
