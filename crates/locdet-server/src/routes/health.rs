use axum::extract::State;
use axum::Json;

use crate::state::{success_envelope, AppState, RequestMeta};

/// GET /health — service health report.
pub async fn health(State(_app): State<AppState>, meta: RequestMeta) -> Json<serde_json::Value> {
    let data = serde_json::json!({
        "services": {
            "store": "healthy",
            "analyzer": "healthy",
            "detector": "healthy",
        }
    });
    let mut body = success_envelope(data, &meta);
    body["status"] = serde_json::json!("healthy");
    Json(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use locdet_core::config::Config;

    #[tokio::test]
    async fn health_reports_services() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = AppState::new(dir.path().to_path_buf(), Config::new("locdet")).unwrap();
        let meta = RequestMeta::for_path("/health");
        let body = health(State(app), meta).await.0;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["data"]["services"]["store"], "healthy");
        assert_eq!(body["meta"]["api_version"], "v1");
    }
}
