use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("file format must be one of: PNG, JPG, PDF (got '{0}')")]
    InvalidFileFormat(String),

    #[error("file size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("invalid job ID format: {0}")]
    InvalidJobId(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("job '{job_id}' cannot be cancelled because it is already {status}")]
    JobAlreadyFinished { job_id: String, status: String },

    #[error("preview not found for job {0}")]
    PreviewNotFound(String),

    #[error("analysis results not found for job {0}")]
    AnalysisNotFound(String),

    #[error("intermediate results not found for job {0}")]
    IntermediateNotFound(String),

    #[error("service '{service}' is currently unavailable")]
    ServiceUnavailable {
        service: String,
        retry_after: Option<u64>,
    },

    #[error("rate limit exceeded, try again later")]
    RateLimited { retry_after: Option<u64> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("model invocation failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DetectError {
    /// Stable machine-readable error code used in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFileFormat(_) => "INVALID_FILE_FORMAT",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::InvalidJobId(_) => "INVALID_JOB_ID",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidFeedback(_) => "INVALID_FEEDBACK",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::JobAlreadyFinished { .. } => "JOB_ALREADY_COMPLETED",
            Self::PreviewNotFound(_) => "PREVIEW_NOT_FOUND",
            Self::AnalysisNotFound(_) => "ANALYSIS_RESULTS_NOT_FOUND",
            Self::IntermediateNotFound(_) => "INTERMEDIATE_RESULTS_NOT_FOUND",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Config(_) => "CONFIGURATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Inference(_) => "MODEL_INVOCATION_FAILED",
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the variant maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidFileFormat(_)
            | Self::FileTooLarge { .. }
            | Self::InvalidJobId(_)
            | Self::InvalidRequest(_)
            | Self::InvalidFeedback(_)
            | Self::JobAlreadyFinished { .. } => 400,
            Self::JobNotFound(_)
            | Self::PreviewNotFound(_)
            | Self::AnalysisNotFound(_)
            | Self::IntermediateNotFound(_) => 404,
            Self::RateLimited { .. } => 429,
            Self::ServiceUnavailable { .. } => 503,
            Self::Config(_)
            | Self::Storage(_)
            | Self::Inference(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => 500,
        }
    }

    /// Whether a retry with backoff has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. } | Self::RateLimited { .. }
        )
    }

    /// Structured detail payload for the API error envelope.
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::InvalidFileFormat(got) => serde_json::json!({
                "received_format": got,
                "allowed_formats": ["png", "jpg", "pdf"],
            }),
            Self::FileTooLarge { size, max } => serde_json::json!({
                "file_size": size,
                "max_size": max,
            }),
            Self::InvalidJobId(id) | Self::JobNotFound(id) => {
                serde_json::json!({ "job_id": id })
            }
            Self::JobAlreadyFinished { job_id, status } => serde_json::json!({
                "job_id": job_id,
                "current_status": status,
            }),
            Self::ServiceUnavailable {
                service,
                retry_after,
            } => {
                let mut v = serde_json::json!({ "service_name": service });
                if let Some(secs) = retry_after {
                    v["retry_after"] = serde_json::json!(secs);
                }
                v
            }
            Self::RateLimited { retry_after } => match retry_after {
                Some(secs) => serde_json::json!({ "retry_after": secs }),
                None => serde_json::json!({}),
            },
            _ => serde_json::json!({}),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
