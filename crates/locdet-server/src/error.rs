use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use locdet_core::error::DetectError;

use crate::state::RequestMeta;

/// Unified error type for HTTP responses.
///
/// Wraps `anyhow::Error` so handlers can use `?` freely; known
/// [`DetectError`] values keep their status code and error code, anything
/// else becomes a 500 `INTERNAL_ERROR`. The request metadata is attached so
/// error envelopes carry the same `meta` object as success responses.
#[derive(Debug)]
pub struct AppError {
    err: anyhow::Error,
    meta: Option<RequestMeta>,
}

impl AppError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self {
            err: err.into(),
            meta: None,
        }
    }

    pub fn of(err: impl Into<anyhow::Error>, meta: &RequestMeta) -> Self {
        Self {
            err: err.into(),
            meta: Some(meta.clone()),
        }
    }

    pub fn with_meta(mut self, meta: &RequestMeta) -> Self {
        self.meta = Some(meta.clone());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self.err.downcast_ref::<DetectError>() {
            Some(e) => (
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.code(),
                e.to_string(),
                e.details(),
            ),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "an internal error occurred".to_string(),
                serde_json::json!({}),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.err, %status, "request failed");
        }

        let mut error_body = serde_json::json!({
            "code": code,
            "message": message,
        });
        if details
            .as_object()
            .map(|m| !m.is_empty())
            .unwrap_or(false)
        {
            error_body["details"] = details;
        }

        let mut body = serde_json::json!({
            "status": "error",
            "error": error_body,
        });
        if let Some(meta) = &self.meta {
            body["meta"] = meta.to_json();
        }

        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_not_found_maps_to_404() {
        let err = AppError::new(DetectError::JobNotFound("job_x".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_format_maps_to_400() {
        let err = AppError::new(DetectError::InvalidFileFormat("bmp".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn already_finished_maps_to_400() {
        let err = AppError::new(DetectError::JobAlreadyFinished {
            job_id: "job_1".into(),
            status: "completed".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unavailable_maps_to_503() {
        let err = AppError::new(DetectError::ServiceUnavailable {
            service: "analyzer".into(),
            retry_after: Some(5),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let err = AppError::new(DetectError::RateLimited { retry_after: None });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn unknown_error_maps_to_500() {
        let err = AppError::new(anyhow::anyhow!("something unexpected"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_is_json_envelope() {
        let meta = RequestMeta::for_path("/api/v1/jobs/job_x");
        let err = AppError::of(DetectError::JobNotFound("job_x".into()), &meta);
        let response = err.into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
