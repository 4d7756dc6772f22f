use std::path::PathBuf;
use std::sync::Arc;

use inference_client::{AnalyzerClient, DetectorClient};
use locdet_core::blobs::BlobStore;
use locdet_core::config::Config;
use locdet_core::error::DetectError;
use locdet_core::store::JobStore;
use locdet_core::{ids, paths};
use tokio::sync::broadcast;

use crate::events::JobEvent;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub store: Arc<JobStore>,
    pub blobs: BlobStore,
    pub analyzer: Arc<AnalyzerClient>,
    pub intermediate_detector: Arc<DetectorClient>,
    pub final_detector: Arc<DetectorClient>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

impl AppState {
    pub fn new(root: PathBuf, config: Config) -> anyhow::Result<Self> {
        let store = JobStore::open(&paths::db_path(&root))?;
        let blobs = BlobStore::new(paths::data_dir(&root));
        let api_key = config.endpoints.api_key();
        let analyzer = AnalyzerClient::new(config.endpoints.analyzer_url.clone(), api_key.clone());
        let intermediate_detector = DetectorClient::new(
            config.endpoints.intermediate_url.clone(),
            config.pipeline.model_version.clone(),
            api_key.clone(),
        );
        let final_detector = DetectorClient::new(
            config.endpoints.final_url.clone(),
            config.pipeline.model_version.clone(),
            api_key,
        );
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            root,
            config: Arc::new(config),
            store: Arc::new(store),
            blobs,
            analyzer: Arc::new(analyzer),
            intermediate_detector: Arc::new(intermediate_detector),
            final_detector: Arc::new(final_detector),
            event_tx,
        })
    }

    /// Publish an event to all WebSocket subscribers. Lagging or absent
    /// receivers are not an error.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.event_tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Request metadata
// ---------------------------------------------------------------------------

/// Per-request correlation metadata, generated by the request-meta middleware
/// and read back out of request extensions by handlers.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
    pub api_version: String,
    pub correlation_id: Option<String>,
}

impl RequestMeta {
    pub fn for_path(path: &str) -> Self {
        Self {
            request_id: ids::generate_request_id(),
            api_version: ids::extract_api_version(path),
            correlation_id: None,
        }
    }

    /// The `meta` object included in every response envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "request_id": self.request_id,
            "api_version": self.api_version,
        })
    }
}

/// `{"status":"success","data":…,"meta":…}` — the success envelope every
/// endpoint returns.
pub fn success_envelope(data: serde_json::Value, meta: &RequestMeta) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "data": data,
        "meta": meta.to_json(),
    })
}

impl<S> axum::extract::FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestMeta>()
            .cloned()
            .unwrap_or_else(|| RequestMeta::for_path(parts.uri.path())))
    }
}

/// Run a blocking storage closure off the async runtime.
pub async fn with_store<T, F>(store: Arc<JobStore>, f: F) -> Result<T, DetectError>
where
    T: Send + 'static,
    F: FnOnce(&JobStore) -> Result<T, DetectError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| DetectError::Storage(format!("task join error: {e}")))?
}

/// Run a blocking blob-store closure off the async runtime.
pub async fn with_blobs<T, F>(blobs: BlobStore, f: F) -> Result<T, DetectError>
where
    T: Send + 'static,
    F: FnOnce(&BlobStore) -> Result<T, DetectError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&blobs))
        .await
        .map_err(|e| DetectError::Storage(format!("task join error: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_opens_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = AppState::new(dir.path().to_path_buf(), Config::new("locdet")).unwrap();
        assert_eq!(state.root, dir.path());
        assert!(locdet_core::paths::db_path(dir.path()).exists());
    }

    #[test]
    fn request_meta_envelope_shape() {
        let meta = RequestMeta::for_path("/api/v2/jobs");
        assert_eq!(meta.api_version, "v2");
        let envelope = success_envelope(serde_json::json!({"ok": true}), &meta);
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["data"]["ok"], true);
        assert_eq!(envelope["meta"]["api_version"], "v2");
        assert!(envelope["meta"]["request_id"]
            .as_str()
            .unwrap()
            .starts_with("req_"));
    }

    #[tokio::test]
    async fn with_store_runs_closure() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(
            JobStore::open(&dir.path().join("test.redb")).unwrap(),
        );
        let job = locdet_core::job::Job::new("png");
        let id = job.job_id.clone();
        with_store(store.clone(), move |s| s.put_job(&job)).await.unwrap();
        let loaded = with_store(store, move |s| s.get_job(&id)).await.unwrap();
        assert_eq!(loaded.status, locdet_core::job::JobStatus::Pending);
    }
}
