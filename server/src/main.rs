mod api;
mod auth;
mod telemetry;

use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::MatchedPath;
use axum::http::Request;
use imgseo_core::config::ServerSettings;
use imgseo_core::gemini::create_provider;
use imgseo_core::media::LibraryStore;
use imgseo_core::service::MetaService;
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa_swagger_ui::SwaggerUi;

/// Shared by every handler.
pub struct AppContext {
    pub service: MetaService,
    /// Bearer token required on `/api/v1` routes; `None` leaves them open.
    pub api_token: Option<String>,
}

/// Application state shared across all handlers
pub type AppState = Arc<AppContext>;

fn build_state(settings: &ServerSettings) -> anyhow::Result<AppState> {
    let store = LibraryStore::open(&settings.library_path).with_context(|| {
        format!(
            "Failed to open media library {}",
            settings.library_path.display()
        )
    })?;

    let provider = create_provider(settings).context("Failed to configure vision provider")?;
    match &provider {
        Some(p) => tracing::info!(
            provider = p.provider_name(),
            model = p.model_name(),
            "vision provider configured"
        ),
        None => tracing::warn!("IMGSEO_GEMINI_API_KEY not set, generate requests will fail"),
    }

    let service = MetaService::new(Arc::new(store), provider)
        .with_prompt_template(settings.prompt_template.clone());

    if settings.api_token.is_none() {
        tracing::warn!("IMGSEO_API_TOKEN not set, endpoints are unauthenticated");
    }

    Ok(Arc::new(AppContext {
        service,
        api_token: settings.api_token.clone(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Check for --openapi flag to dump spec and exit
    if env::args().any(|arg| arg == "--openapi") {
        let spec = api::openapi()
            .to_pretty_json()
            .context("Failed to serialize OpenAPI document")?;
        println!("{}", spec);
        return Ok(());
    }

    telemetry::init_telemetry()?;

    let settings = ServerSettings::from_env().context("Invalid server configuration")?;
    let state = build_state(&settings)?;

    let swagger_ui = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api::openapi());

    let app = api::router(state).merge(swagger_ui).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let matched_path = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str)
                    .unwrap_or(request.uri().path());

                // Health checks are too noisy for info-level spans
                if matched_path == "/api/v1/ping" {
                    tracing::trace_span!("http_request")
                } else {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %matched_path,
                    )
                }
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::http::Response<_>, latency: std::time::Duration, span: &Span| {
                    if span.metadata().map(|m| m.level()) == Some(&tracing::Level::TRACE) {
                        return;
                    }
                    let status = response.status().as_u16();
                    if status >= 500 {
                        tracing::error!(
                            status = %status,
                            latency_ms = %latency.as_millis(),
                            "request failed with server error"
                        );
                    } else {
                        tracing::info!(
                            status = %status,
                            latency_ms = %latency.as_millis(),
                            "request completed"
                        );
                    }
                },
            )
            .on_failure(
                |error: tower_http::classify::ServerErrorsFailureClass,
                 latency: std::time::Duration,
                 _span: &Span| {
                    tracing::error!(
                        error = %error,
                        latency_ms = %latency.as_millis(),
                        "request failed"
                    );
                },
            ),
    );

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    let local_addr = listener.local_addr()?;

    tracing::info!("Server listening on {}", local_addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", local_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
