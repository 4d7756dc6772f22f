//! Three-stage detection pipeline: preview → intermediate → final.
//!
//! Each stage runs under a retry envelope (3 attempts, exponential backoff
//! with stage-specific base delays) and a per-stage timeout. A cancelled job
//! stops the pipeline between stages; failures mark the job failed and are
//! pushed to subscribers.

use std::time::{Duration, Instant};

use chrono::Utc;
use inference_client::ModelInput;
use locdet_core::error::DetectError;
use locdet_core::job::{JobError, JobStatus};
use locdet_core::postprocess::{postprocess, OutputFormat, PostprocessOptions};
use locdet_core::retry::{retry_with_policy, RetryPolicy};
use locdet_core::rooms::detect_rooms;
use locdet_core::stage::{Stage, StageResult, StageTimings};

use crate::events::{JobEvent, ServerMessage};
use crate::state::{with_blobs, with_store, AppState};

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

fn stage_retry_policy(stage: Stage) -> RetryPolicy {
    let base = match stage {
        Stage::Preview => 1,
        Stage::Intermediate => 2,
        Stage::Final => 4,
    };
    RetryPolicy::with_initial_delay(Duration::from_secs(base))
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

/// Drive all three stages for a job. Spawned as a background task.
pub async fn run_pipeline(app: AppState, job_id: String) {
    tracing::info!(job_id = %job_id, "starting detection pipeline");
    match drive(&app, &job_id).await {
        Ok(()) => tracing::info!(job_id = %job_id, "pipeline finished"),
        Err(DetectError::JobAlreadyFinished { .. }) => {
            // Lost a race with cancellation; the cancel path owns the event.
            tracing::info!(job_id = %job_id, "pipeline stopped: job already finished");
        }
        Err(err) => {
            tracing::error!(job_id = %job_id, error = %err, "pipeline failed");
            let job_err = JobError::from_error(&err);
            let store_err = {
                let job_err = job_err.clone();
                let id = job_id.clone();
                with_store(app.store.clone(), move |s| {
                    s.update_job(&id, |job| {
                        job.update_status(JobStatus::Failed, Some(job_err.clone()));
                        Ok(())
                    })
                })
                .await
            };
            if let Err(e) = store_err {
                tracing::error!(job_id = %job_id, error = %e, "failed to record job failure");
            }
            app.publish(JobEvent::new(
                job_id.clone(),
                ServerMessage::job_failed(&job_id, job_err),
            ));
        }
    }
}

async fn drive(app: &AppState, job_id: &str) -> Result<(), DetectError> {
    // Mark processing; refuses jobs that already reached a terminal state.
    {
        let id = job_id.to_string();
        with_store(app.store.clone(), move |s| {
            s.update_job(&id, |job| {
                if !matches!(job.status, JobStatus::Pending | JobStatus::Processing) {
                    return Err(DetectError::JobAlreadyFinished {
                        job_id: job.job_id.clone(),
                        status: job.status.to_string(),
                    });
                }
                job.update_status(JobStatus::Processing, None);
                Ok(())
            })
        })
        .await?;
    }

    let preview = run_stage(app, job_id, Stage::Preview).await?;
    app.publish(JobEvent::new(
        job_id,
        ServerMessage::progress(job_id, Stage::Preview, "Preview processing completed", Some(20)),
    ));
    app.publish(JobEvent::new(
        job_id,
        ServerMessage::stage_complete(job_id, Stage::Preview, preview),
    ));

    if check_cancelled(app, job_id).await? {
        app.publish(JobEvent::new(job_id, ServerMessage::job_cancelled(job_id)));
        return Ok(());
    }

    let intermediate = run_stage(app, job_id, Stage::Intermediate).await?;
    app.publish(JobEvent::new(
        job_id,
        ServerMessage::progress(
            job_id,
            Stage::Intermediate,
            "Intermediate processing completed",
            Some(10),
        ),
    ));
    app.publish(JobEvent::new(
        job_id,
        ServerMessage::stage_complete(job_id, Stage::Intermediate, intermediate),
    ));

    if check_cancelled(app, job_id).await? {
        app.publish(JobEvent::new(job_id, ServerMessage::job_cancelled(job_id)));
        return Ok(());
    }

    let final_result = run_stage(app, job_id, Stage::Final).await?;
    app.publish(JobEvent::new(
        job_id,
        ServerMessage::job_complete(job_id, final_result),
    ));
    Ok(())
}

async fn check_cancelled(app: &AppState, job_id: &str) -> Result<bool, DetectError> {
    let id = job_id.to_string();
    let job = with_store(app.store.clone(), move |s| s.get_job(&id)).await?;
    Ok(job.status == JobStatus::Cancelled)
}

/// Run one stage under its retry envelope and the configured timeout.
async fn run_stage(app: &AppState, job_id: &str, stage: Stage) -> Result<StageResult, DetectError> {
    let policy = stage_retry_policy(stage);
    let timeout = Duration::from_secs(app.config.pipeline.stage_timeout_seconds);
    retry_with_policy(&policy, DetectError::is_retryable, || async move {
        let work = async {
            match stage {
                Stage::Preview => run_preview(app, job_id).await,
                Stage::Intermediate => run_intermediate(app, job_id).await,
                Stage::Final => run_final(app, job_id).await,
            }
        };
        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(job_id, stage = %stage, "stage timed out");
                Err(DetectError::ServiceUnavailable {
                    service: stage.as_str().to_string(),
                    retry_after: None,
                })
            }
        }
    })
    .await
}

// ---------------------------------------------------------------------------
// Stage 1 — preview
// ---------------------------------------------------------------------------

/// Analyze the blueprint and return fast heuristic room detections.
///
/// Results are cached by blueprint hash and model version, so re-uploads of
/// the same document skip the analyzer entirely.
pub async fn run_preview(app: &AppState, job_id: &str) -> Result<StageResult, DetectError> {
    let started = Instant::now();
    let id = job_id.to_string();
    let job = with_store(app.store.clone(), move |s| s.get_job(&id)).await?;

    let model_version = app.config.pipeline.model_version.clone();
    if let Some(hash) = job.blueprint_hash.clone() {
        let mv = model_version.clone();
        if let Some(cached) =
            with_store(app.store.clone(), move |s| s.get_cached_preview(&hash, &mv)).await?
        {
            tracing::info!(job_id, "returning cached preview");
            return Ok(cached);
        }
    }

    let blueprint_key = job
        .blueprint_key
        .clone()
        .ok_or_else(|| DetectError::InvalidRequest("job has no stored blueprint".to_string()))?;
    let filename = blueprint_key
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let format = job
        .blueprint_format
        .clone()
        .unwrap_or_else(|| "png".to_string());

    let bytes = {
        let id = job_id.to_string();
        with_blobs(app.blobs.clone(), move |b| b.read_blueprint(&id, &filename)).await?
    };

    let analysis_started = Instant::now();
    let analysis = {
        let analyzer = &app.analyzer;
        let bytes = &bytes;
        let format = &format;
        retry_with_policy(
            &RetryPolicy::default(),
            DetectError::is_retryable,
            move || async move { analyzer.analyze(bytes, format).await.map_err(DetectError::from) },
        )
        .await?
    };
    let analysis_seconds = analysis_started.elapsed().as_secs_f64();

    {
        let id = job_id.to_string();
        let analysis = analysis.clone();
        with_blobs(app.blobs.clone(), move |b| b.store_analysis(&id, &analysis)).await?;
    }

    let detection_started = Instant::now();
    let rooms = detect_rooms(&analysis);
    let detection_seconds = detection_started.elapsed().as_secs_f64();

    let total = started.elapsed().as_secs_f64();
    let result = StageResult {
        job_id: job_id.to_string(),
        stage: Stage::Preview,
        rooms,
        processing_time_seconds: round2(total),
        timestamp: Utc::now(),
        timing_metrics: StageTimings {
            analysis_seconds: Some(round2(analysis_seconds)),
            room_detection_seconds: Some(round2(detection_seconds)),
            total_seconds: round2(total),
            ..Default::default()
        },
    };

    match job.blueprint_hash {
        Some(hash) => {
            let ttl = app.config.pipeline.preview_cache_ttl_seconds;
            let cached = result.clone();
            let store_result = with_store(app.store.clone(), move |s| {
                s.store_cached_preview(&hash, &model_version, &cached, ttl)
            })
            .await;
            if let Err(err) = store_result {
                // The preview is only useful if later stages can trust the
                // cache, so a failed write fails the stage.
                tracing::error!(job_id, error = %err, "preview cache store failed");
                return Err(DetectError::ServiceUnavailable {
                    service: "preview cache".to_string(),
                    retry_after: Some(5),
                });
            }
        }
        None => {
            tracing::warn!(job_id, "job has no blueprint hash, skipping cache storage");
        }
    }

    tracing::info!(
        job_id,
        rooms = result.rooms.len(),
        seconds = result.processing_time_seconds,
        "preview completed"
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Stage 2 — intermediate
// ---------------------------------------------------------------------------

/// Refine the preview with the intermediate detection model.
pub async fn run_intermediate(app: &AppState, job_id: &str) -> Result<StageResult, DetectError> {
    let started = Instant::now();
    {
        let id = job_id.to_string();
        with_store(app.store.clone(), move |s| s.get_job(&id)).await?;
    }

    let analysis = {
        let id = job_id.to_string();
        with_blobs(app.blobs.clone(), move |b| b.load_analysis(&id)).await?
    };
    tracing::info!(
        job_id,
        text_blocks = analysis.text_blocks.len(),
        layout_blocks = analysis.layout_blocks.len(),
        "loaded analysis results"
    );

    let input = ModelInput::from_analysis(&analysis);
    let inference_started = Instant::now();
    let detections = {
        let detector = &app.intermediate_detector;
        let input = &input;
        retry_with_policy(
            &RetryPolicy::default(),
            DetectError::is_retryable,
            move || async move { detector.invoke(input).await.map_err(DetectError::from) },
        )
        .await?
    };
    let inference_seconds = inference_started.elapsed().as_secs_f64();

    let postprocess_started = Instant::now();
    let opts = PostprocessOptions {
        output_format: OutputFormat::Mvp,
        confidence_threshold: app.config.pipeline.confidence_threshold,
        image_width: None,
        image_height: None,
        filter_overlaps: true,
    };
    let summary = postprocess(&detections, &opts);
    let postprocess_seconds = postprocess_started.elapsed().as_secs_f64();

    let total = started.elapsed().as_secs_f64();
    let result = StageResult {
        job_id: job_id.to_string(),
        stage: Stage::Intermediate,
        rooms: summary.rooms,
        processing_time_seconds: round2(total),
        timestamp: Utc::now(),
        timing_metrics: StageTimings {
            inference_seconds: Some(round2(inference_seconds)),
            postprocessing_seconds: Some(round2(postprocess_seconds)),
            total_seconds: round2(total),
            ..Default::default()
        },
    };

    {
        let id = job_id.to_string();
        let result = result.clone();
        with_blobs(app.blobs.clone(), move |b| b.store_intermediate(&id, &result)).await?;
    }

    tracing::info!(
        job_id,
        rooms = result.rooms.len(),
        seconds = result.processing_time_seconds,
        "intermediate stage completed"
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Stage 3 — final
// ---------------------------------------------------------------------------

/// Produce precise room boundaries and mark the job completed.
pub async fn run_final(app: &AppState, job_id: &str) -> Result<StageResult, DetectError> {
    let started = Instant::now();

    let intermediate = {
        let id = job_id.to_string();
        with_blobs(app.blobs.clone(), move |b| b.load_intermediate(&id)).await?
    };
    let analysis = {
        let id = job_id.to_string();
        with_blobs(app.blobs.clone(), move |b| b.load_analysis(&id)).await?
    };

    let input =
        ModelInput::from_analysis(&analysis).with_intermediate_rooms(intermediate.rooms.clone());
    let inference_started = Instant::now();
    let detections = {
        let detector = &app.final_detector;
        let input = &input;
        retry_with_policy(
            &RetryPolicy::default(),
            DetectError::is_retryable,
            move || async move { detector.invoke(input).await.map_err(DetectError::from) },
        )
        .await?
    };
    let inference_seconds = inference_started.elapsed().as_secs_f64();

    let postprocess_started = Instant::now();
    let opts = PostprocessOptions {
        output_format: app.config.pipeline.output_format,
        confidence_threshold: app.config.pipeline.confidence_threshold,
        image_width: analysis.metadata.image_width,
        image_height: analysis.metadata.image_height,
        filter_overlaps: true,
    };
    let summary = postprocess(&detections, &opts);
    let postprocess_seconds = postprocess_started.elapsed().as_secs_f64();
    tracing::info!(
        job_id,
        rooms = summary.detection_count,
        filtered = summary.filtered_count,
        "final post-processing completed"
    );

    let total = started.elapsed().as_secs_f64();
    let result = StageResult {
        job_id: job_id.to_string(),
        stage: Stage::Final,
        rooms: summary.rooms,
        processing_time_seconds: round2(total),
        timestamp: Utc::now(),
        timing_metrics: StageTimings {
            inference_seconds: Some(round2(inference_seconds)),
            postprocessing_seconds: Some(round2(postprocess_seconds)),
            total_seconds: round2(total),
            ..Default::default()
        },
    };

    let result_key = {
        let id = job_id.to_string();
        let result = result.clone();
        with_blobs(app.blobs.clone(), move |b| b.store_final(&id, &result)).await?
    };

    {
        let id = job_id.to_string();
        with_store(app.store.clone(), move |s| {
            s.update_job(&id, |job| {
                job.result_key = Some(result_key.clone());
                job.update_status(JobStatus::Completed, None);
                Ok(())
            })
        })
        .await?;
    }

    tracing::info!(
        job_id,
        rooms = result.rooms.len(),
        seconds = result.processing_time_seconds,
        "final stage completed"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_policies_use_step_delays() {
        assert_eq!(
            stage_retry_policy(Stage::Preview).initial_delay,
            Duration::from_secs(1)
        );
        assert_eq!(
            stage_retry_policy(Stage::Intermediate).initial_delay,
            Duration::from_secs(2)
        );
        assert_eq!(
            stage_retry_policy(Stage::Final).initial_delay,
            Duration::from_secs(4)
        );
        assert_eq!(stage_retry_policy(Stage::Final).max_retries, 3);
    }

    #[test]
    fn round2_truncates_noise() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(0.999), 1.0);
    }
}
