use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use locdet_core::error::DetectError;
use locdet_core::feedback::{Correction, Feedback, FeedbackKind};
use locdet_core::job::validate_job_id;

use crate::error::AppError;
use crate::state::{success_envelope, with_store, AppState, RequestMeta};

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/:job_id/feedback — submit feedback for a job.
pub async fn submit_feedback(
    State(app): State<AppState>,
    meta: RequestMeta,
    Path(job_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    validate_job_id(&job_id).map_err(|e| AppError::of(e, &meta))?;

    let feedback = parse_feedback(&job_id, &body).map_err(|e| AppError::of(e, &meta))?;

    // The job must exist before feedback is accepted for it.
    {
        let id = job_id.clone();
        with_store(app.store.clone(), move |s| s.get_job(&id))
            .await
            .map_err(|e| AppError::of(e, &meta))?;
    }

    {
        let feedback = feedback.clone();
        with_store(app.store.clone(), move |s| s.put_feedback(&feedback))
            .await
            .map_err(|e| AppError::of(e, &meta))?;
    }

    tracing::info!(
        feedback_id = %feedback.feedback_id,
        job_id = %job_id,
        kind = feedback.feedback.as_str(),
        "feedback submitted"
    );

    let data = serde_json::json!({
        "feedback_id": feedback.feedback_id,
        "job_id": feedback.job_id,
        "message": "Feedback submitted successfully",
        "request_id": meta.request_id,
    });
    Ok((StatusCode::CREATED, Json(success_envelope(data, &meta))))
}

fn parse_feedback(job_id: &str, body: &serde_json::Value) -> Result<Feedback, DetectError> {
    let kind_str = body
        .get("feedback")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DetectError::InvalidRequest("missing required field: feedback".into()))?;
    let kind: FeedbackKind = serde_json::from_value(serde_json::json!(kind_str)).map_err(|_| {
        DetectError::InvalidFeedback(format!(
            "feedback type must be one of: wrong, correct, partial (got '{kind_str}')"
        ))
    })?;

    let room_id = body
        .get("room_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let correction = match body.get("correction") {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<Correction>(value.clone()).map_err(|_| {
                DetectError::InvalidFeedback(
                    "correction bounding_box must be an array of 4 numbers".into(),
                )
            })?,
        ),
    };

    let feedback = Feedback::new(job_id, kind, room_id, correction);
    feedback.validate()?;
    Ok(feedback)
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/:job_id/feedback — list feedback for a job.
pub async fn list_feedback(
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

    let feedback = {
        let id = job_id.clone();
        with_store(app.store.clone(), move |s| s.feedback_for_job(&id))
            .await
            .map_err(|e| AppError::of(e, &meta))?
    };

    tracing::info!(job_id = %job_id, count = feedback.len(), "feedback retrieved");
    let data = serde_json::json!({
        "feedback": feedback,
    });
    Ok(Json(success_envelope(data, &meta)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_requires_feedback_field() {
        let err = parse_feedback("job_1", &serde_json::json!({})).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let err =
            parse_feedback("job_1", &serde_json::json!({"feedback": "meh"})).unwrap_err();
        assert_eq!(err.code(), "INVALID_FEEDBACK");
    }

    #[test]
    fn parse_wrong_requires_correction() {
        let err =
            parse_feedback("job_1", &serde_json::json!({"feedback": "wrong"})).unwrap_err();
        assert_eq!(err.code(), "INVALID_FEEDBACK");
    }

    #[test]
    fn parse_accepts_full_payload() {
        let body = serde_json::json!({
            "feedback": "wrong",
            "room_id": "room_001",
            "correction": { "bounding_box": [0.0, 0.0, 120.0, 80.0], "name": "Kitchen" }
        });
        let feedback = parse_feedback("job_1", &body).unwrap();
        assert_eq!(feedback.feedback, FeedbackKind::Wrong);
        assert_eq!(feedback.room_id.as_deref(), Some("room_001"));
        assert_eq!(
            feedback.correction.unwrap().bounding_box,
            vec![0.0, 0.0, 120.0, 80.0]
        );
    }

    #[test]
    fn parse_rejects_short_bounding_box() {
        let body = serde_json::json!({
            "feedback": "wrong",
            "correction": { "bounding_box": [0.0, 0.0] }
        });
        let err = parse_feedback("job_1", &body).unwrap_err();
        assert_eq!(err.code(), "INVALID_FEEDBACK");
    }
}
