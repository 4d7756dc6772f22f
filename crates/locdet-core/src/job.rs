use crate::error::{DetectError, Result};
use crate::ids;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Job records are purged this many days after creation.
pub const JOB_TTL_DAYS: i64 = 7;

pub const ALLOWED_FORMATS: [&str; 3] = ["png", "jpg", "pdf"];

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobError
// ---------------------------------------------------------------------------

/// Structured failure details attached to a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl JobError {
    pub fn from_error(err: &DetectError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A room-detection job over one uploaded blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Unix timestamp after which the record may be purged.
    pub expires_at: i64,
}

impl Job {
    pub fn new(blueprint_format: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: ids::generate_job_id(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            blueprint_key: None,
            blueprint_format: Some(blueprint_format.into()),
            blueprint_hash: None,
            result_key: None,
            error: None,
            request_id: None,
            correlation_id: None,
            api_version: None,
            expires_at: (now + Duration::days(JOB_TTL_DAYS)).timestamp(),
        }
    }

    /// Move the job to a new status, stamping `updated_at`.
    pub fn update_status(&mut self, status: JobStatus, error: Option<JobError>) {
        self.status = status;
        self.updated_at = Utc::now();
        if error.is_some() {
            self.error = error;
        }
    }

    /// Only jobs that have not reached a terminal state can be cancelled.
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.job_id.starts_with("job_") {
            return Err(DetectError::InvalidJobId(self.job_id.clone()));
        }
        if let Some(format) = &self.blueprint_format {
            if !ALLOWED_FORMATS.contains(&format.to_lowercase().as_str()) {
                return Err(DetectError::InvalidFileFormat(format.clone()));
            }
        }
        if self.status == JobStatus::Failed && self.error.is_none() {
            return Err(DetectError::InvalidRequest(
                "error is required when status is failed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reject identifiers that do not look like job ids before touching storage.
pub fn validate_job_id(job_id: &str) -> Result<()> {
    if job_id.is_empty() || !job_id.starts_with("job_") {
        return Err(DetectError::InvalidJobId(job_id.to_string()));
    }
    Ok(())
}
