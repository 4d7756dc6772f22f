pub mod error;
pub mod events;
pub mod pipeline;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;
use locdet_core::config::Config;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};

use state::RequestMeta;

/// Generate per-request metadata and stamp `X-Request-ID` on every response.
async fn request_meta(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut meta = RequestMeta::for_path(req.uri().path());
    if let Some(correlation_id) = req
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
    {
        meta.correlation_id = Some(correlation_id.to_string());
    }
    req.extensions_mut().insert(meta.clone());

    let mut resp = next.run(req).await;
    if let Ok(value) = axum::http::HeaderValue::from_str(&meta.request_id) {
        resp.headers_mut().insert("x-request-id", value);
    }
    resp
}

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(root: PathBuf, config: Config) -> anyhow::Result<Router> {
    let app_state = state::AppState::new(root, config)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Jobs
        .route("/api/v1/jobs", post(routes::jobs::create_job))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job))
        .route("/api/v1/jobs/{job_id}", delete(routes::jobs::cancel_job))
        .route(
            "/api/v1/jobs/{job_id}/process",
            post(routes::jobs::process_job),
        )
        // Preview
        .route(
            "/api/v1/jobs/{job_id}/preview",
            post(routes::preview::trigger_preview),
        )
        .route(
            "/api/v1/jobs/{job_id}/preview",
            get(routes::preview::get_preview),
        )
        // Analysis results
        .route(
            "/api/v1/jobs/{job_id}/analysis",
            get(routes::analysis::get_analysis),
        )
        // Feedback
        .route(
            "/api/v1/jobs/{job_id}/feedback",
            post(routes::feedback::submit_feedback),
        )
        .route(
            "/api/v1/jobs/{job_id}/feedback",
            get(routes::feedback::list_feedback),
        )
        // Progress WebSocket
        .route("/api/v1/ws", get(routes::ws::ws_handler))
        .layer(axum::middleware::from_fn(request_meta))
        .layer(cors)
        .with_state(app_state))
}

/// Start the locdet API server.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let config = Config::load_or_default(&root, "locdet");
    log_config_warnings(&config);
    let app = build_router(root, config)?;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("locdet API server listening on http://localhost:{port}");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the locdet API server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(root: PathBuf, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let config = Config::load_or_default(&root, "locdet");
    log_config_warnings(&config);
    let app = build_router(root, config)?;

    tracing::info!("locdet API server listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}

fn log_config_warnings(config: &Config) {
    for warning in config.validate() {
        match warning.level {
            locdet_core::config::WarnLevel::Error => tracing::error!("{}", warning.message),
            locdet_core::config::WarnLevel::Warning => tracing::warn!("{}", warning.message),
        }
    }
}
