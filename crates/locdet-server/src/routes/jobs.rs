use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine as _;

use locdet_core::blueprint::{self, BlueprintFormat};
use locdet_core::error::DetectError;
use locdet_core::job::{validate_job_id, Job, JobStatus};

use crate::error::AppError;
use crate::events::{JobEvent, ServerMessage};
use crate::state::{success_envelope, with_blobs, with_store, AppState, RequestMeta};

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs — create a job from a base64 blueprint upload.
///
/// The body is parsed leniently so malformed requests produce the service's
/// own 400 envelope rather than a framework rejection:
/// `{"blueprint": {"file": <base64>, "format": "png"|"jpg"|"pdf", "filename"?}}`
pub async fn create_job(
    State(app): State<AppState>,
    meta: RequestMeta,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let result = create_job_inner(&app, &meta, body).await;
    match result {
        Ok(job) => {
            tracing::info!(
                job_id = %job.job_id,
                format = job.blueprint_format.as_deref().unwrap_or(""),
                request_id = %meta.request_id,
                "job created"
            );
            Ok((
                StatusCode::CREATED,
                Json(success_envelope(serde_json::to_value(&job)?, &meta)),
            ))
        }
        Err(err) => Err(AppError::of(err, &meta)),
    }
}

async fn create_job_inner(
    app: &AppState,
    meta: &RequestMeta,
    body: serde_json::Value,
) -> Result<Job, DetectError> {
    let blueprint = body
        .get("blueprint")
        .and_then(|v| v.as_object())
        .ok_or_else(|| DetectError::InvalidRequest("missing required field: blueprint".into()))?;

    let format_str = blueprint
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let format = BlueprintFormat::parse(format_str)?;

    let file_b64 = blueprint
        .get("file")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let content = base64::engine::general_purpose::STANDARD
        .decode(file_b64)
        .map_err(|e| DetectError::InvalidRequest(format!("invalid base64 file data: {e}")))?;

    let hash = blueprint::validate_upload(&content, format, app.config.limits.max_upload_bytes)?;

    let filename = blueprint
        .get("filename")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format.default_filename());

    let mut job = Job::new(format.as_str());
    job.blueprint_hash = Some(hash);
    job.request_id = Some(meta.request_id.clone());
    job.correlation_id = meta.correlation_id.clone();
    job.api_version = Some(meta.api_version.clone());

    // Blob first, then record, so a failed write never leaves a job record
    // pointing at a missing blueprint.
    let blueprint_key = {
        let job_id = job.job_id.clone();
        let filename = filename.clone();
        with_blobs(app.blobs.clone(), move |b| {
            b.store_blueprint(&job_id, &filename, &content)
        })
        .await?
    };
    job.blueprint_key = Some(blueprint_key);

    let stored = {
        let job = job.clone();
        with_store(app.store.clone(), move |s| s.put_job(&job)).await
    };
    if let Err(err) = stored {
        tracing::error!(job_id = %job.job_id, error = %err, "job record write failed, removing blueprint");
        let job_id = job.job_id.clone();
        let cleanup = with_blobs(app.blobs.clone(), move |b| {
            b.delete_blueprint(&job_id, &filename)
        })
        .await;
        if let Err(cleanup_err) = cleanup {
            tracing::error!(job_id = %job.job_id, error = %cleanup_err, "blueprint cleanup failed");
        }
        return Err(err);
    }

    Ok(job)
}

// ---------------------------------------------------------------------------
// Get / cancel
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/:job_id — fetch a job record.
pub async fn get_job(
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

    tracing::info!(job_id = %job_id, status = %job.status, "job retrieved");
    Ok(Json(success_envelope(
        serde_json::to_value(&job).map_err(|e| AppError::of(e, &meta))?,
        &meta,
    )))
}

/// DELETE /api/v1/jobs/:job_id — cancel a pending or processing job.
pub async fn cancel_job(
    State(app): State<AppState>,
    meta: RequestMeta,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_job_id(&job_id).map_err(|e| AppError::of(e, &meta))?;

    let job = {
        let id = job_id.clone();
        with_store(app.store.clone(), move |s| s.cancel_job(&id))
            .await
            .map_err(|e| AppError::of(e, &meta))?
    };

    tracing::info!(job_id = %job_id, "job cancelled");
    app.publish(JobEvent::new(
        job_id.clone(),
        ServerMessage::job_cancelled(&job_id),
    ));

    Ok(Json(success_envelope(
        serde_json::to_value(&job).map_err(|e| AppError::of(e, &meta))?,
        &meta,
    )))
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/:job_id/process — start the full pipeline in the
/// background. Returns 202 with the job record.
pub async fn process_job(
    State(app): State<AppState>,
    meta: RequestMeta,
    Path(job_id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    validate_job_id(&job_id).map_err(|e| AppError::of(e, &meta))?;

    let job = {
        let id = job_id.clone();
        with_store(app.store.clone(), move |s| s.get_job(&id))
            .await
            .map_err(|e| AppError::of(e, &meta))?
    };
    if !matches!(job.status, JobStatus::Pending | JobStatus::Processing) {
        return Err(AppError::of(
            DetectError::JobAlreadyFinished {
                job_id: job.job_id.clone(),
                status: job.status.to_string(),
            },
            &meta,
        ));
    }

    tracing::info!(job_id = %job_id, "pipeline run requested");
    tokio::spawn(crate::pipeline::run_pipeline(app.clone(), job_id.clone()));

    Ok((
        StatusCode::ACCEPTED,
        Json(success_envelope(
            serde_json::to_value(&job).map_err(|e| AppError::of(e, &meta))?,
            &meta,
        )),
    ))
}
