//! Event payloads pushed to WebSocket subscribers.

use chrono::{DateTime, Utc};
use locdet_core::job::{Job, JobError};
use locdet_core::stage::{Stage, StageResult};
use serde::{Deserialize, Serialize};

/// One event on the broadcast bus; receivers filter by `job_id`.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: String,
    pub message: ServerMessage,
}

impl JobEvent {
    pub fn new(job_id: impl Into<String>, message: ServerMessage) -> Self {
        Self {
            job_id: job_id.into(),
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed {
        job_id: String,
        job_status: String,
        timestamp: DateTime<Utc>,
    },
    JobStatus {
        job_id: String,
        status: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        blueprint_format: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<JobError>,
        timestamp: DateTime<Utc>,
    },
    ProgressUpdate {
        job_id: String,
        stage: Stage,
        progress: u8,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        estimated_seconds_remaining: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    StageComplete {
        job_id: String,
        stage: Stage,
        results: StageResult,
        timestamp: DateTime<Utc>,
    },
    JobComplete {
        job_id: String,
        results: StageResult,
        timestamp: DateTime<Utc>,
    },
    JobFailed {
        job_id: String,
        error: JobError,
        timestamp: DateTime<Utc>,
    },
    JobCancelled {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn subscribed(job: &Job) -> Self {
        Self::Subscribed {
            job_id: job.job_id.clone(),
            job_status: job.status.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn job_status(job: &Job) -> Self {
        Self::JobStatus {
            job_id: job.job_id.clone(),
            status: job.status.to_string(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            blueprint_format: job.blueprint_format.clone(),
            result_key: job.result_key.clone(),
            error: job.error.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn progress(
        job_id: &str,
        stage: Stage,
        message: impl Into<String>,
        estimated_seconds_remaining: Option<u64>,
    ) -> Self {
        Self::ProgressUpdate {
            job_id: job_id.to_string(),
            stage,
            progress: stage.progress_percent(),
            message: message.into(),
            estimated_seconds_remaining,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_complete(job_id: &str, stage: Stage, results: StageResult) -> Self {
        Self::StageComplete {
            job_id: job_id.to_string(),
            stage,
            results,
            timestamp: Utc::now(),
        }
    }

    pub fn job_complete(job_id: &str, results: StageResult) -> Self {
        Self::JobComplete {
            job_id: job_id.to_string(),
            results,
            timestamp: Utc::now(),
        }
    }

    pub fn job_failed(job_id: &str, error: JobError) -> Self {
        Self::JobFailed {
            job_id: job_id.to_string(),
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn job_cancelled(job_id: &str) -> Self {
        Self::JobCancelled {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self::Error {
            message: message.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { job_id: String },
    CancelJob { job_id: String },
    RequestStatus { job_id: String },
}

pub const ALLOWED_CLIENT_MESSAGE_TYPES: [&str; 3] = ["subscribe", "cancel_job", "request_status"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_by_type_tag() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","job_id":"job_1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                job_id: "job_1".into()
            }
        );
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"cancel_job","job_id":"job_1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CancelJob { .. }));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"nope"}"#).is_err());
    }

    #[test]
    fn server_messages_serialize_with_type_tag() {
        let msg = ServerMessage::progress("job_1", Stage::Intermediate, "working", Some(10));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "progress_update");
        assert_eq!(json["progress"], 66);
        assert_eq!(json["stage"], "intermediate");
        assert_eq!(json["estimated_seconds_remaining"], 10);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn job_cancelled_shape() {
        let json = serde_json::to_value(ServerMessage::job_cancelled("job_9")).unwrap();
        assert_eq!(json["type"], "job_cancelled");
        assert_eq!(json["job_id"], "job_9");
    }

    #[test]
    fn error_omits_empty_details() {
        let json = serde_json::to_value(ServerMessage::error("bad frame", None)).unwrap();
        assert!(json.get("details").is_none());
    }
}
