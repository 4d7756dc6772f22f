use axum::extract::{Path, State};
use axum::Json;

use locdet_core::job::validate_job_id;

use crate::error::AppError;
use crate::state::{success_envelope, with_blobs, with_store, AppState, RequestMeta};

/// GET /api/v1/jobs/:job_id/analysis — stored layout-analysis results.
pub async fn get_analysis(
    State(app): State<AppState>,
    meta: RequestMeta,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_job_id(&job_id).map_err(|e| AppError::of(e, &meta))?;

    {
        let id = job_id.clone();
        with_store(app.store.clone(), move |s| s.get_job(&id))
            .await
            .map_err(|e| AppError::of(e, &meta))?;
    }

    let analysis = {
        let id = job_id.clone();
        with_blobs(app.blobs.clone(), move |b| b.load_analysis(&id))
            .await
            .map_err(|e| AppError::of(e, &meta))?
    };

    tracing::info!(
        job_id = %job_id,
        text_blocks = analysis.text_blocks.len(),
        layout_blocks = analysis.layout_blocks.len(),
        "analysis results retrieved"
    );

    let data = serde_json::json!({
        "key": format!("cache/analysis/{job_id}/analysis.json"),
        "text_blocks": analysis.text_blocks,
        "layout_blocks": analysis.layout_blocks,
        "metadata": analysis.metadata,
    });
    Ok(Json(success_envelope(data, &meta)))
}
