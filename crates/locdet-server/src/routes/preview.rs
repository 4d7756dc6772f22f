use axum::extract::{Path, State};
use axum::Json;

use locdet_core::error::DetectError;
use locdet_core::job::validate_job_id;

use crate::error::AppError;
use crate::pipeline;
use crate::state::{success_envelope, with_store, AppState, RequestMeta};

/// POST /api/v1/jobs/:job_id/preview — run the preview stage inline and
/// return its result. Cached previews short-circuit the analyzer call.
pub async fn trigger_preview(
    State(app): State<AppState>,
    meta: RequestMeta,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_job_id(&job_id).map_err(|e| AppError::of(e, &meta))?;

    let result = pipeline::run_preview(&app, &job_id)
        .await
        .map_err(|e| AppError::of(e, &meta))?;

    Ok(Json(success_envelope(
        serde_json::to_value(&result).map_err(|e| AppError::of(e, &meta))?,
        &meta,
    )))
}

/// GET /api/v1/jobs/:job_id/preview — cached preview result or 404.
pub async fn get_preview(
    State(app): State<AppState>,
    meta: RequestMeta,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_job_id(&job_id).map_err(|e| AppError::of(e, &meta))?;

    let job = {
        let id = job_id.clone();
        with_store(app.store.clone(), move |s| s.get_job(&id))
            .await
            .map_err(|e| AppError::of(e, &meta))?
    };

    let Some(hash) = job.blueprint_hash else {
        tracing::warn!(job_id = %job_id, "job has no blueprint hash, preview lookup impossible");
        return Err(AppError::of(DetectError::PreviewNotFound(job_id), &meta));
    };

    let model_version = app.config.pipeline.model_version.clone();
    let cached = with_store(app.store.clone(), move |s| {
        s.get_cached_preview(&hash, &model_version)
    })
    .await
    .map_err(|e| AppError::of(e, &meta))?;

    match cached {
        Some(result) => {
            tracing::info!(job_id = %job_id, "cached preview retrieved");
            Ok(Json(success_envelope(
                serde_json::to_value(&result).map_err(|e| AppError::of(e, &meta))?,
                &meta,
            )))
        }
        None => Err(AppError::of(DetectError::PreviewNotFound(job_id), &meta)),
    }
}
