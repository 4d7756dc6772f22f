//! Pipeline stage names and per-stage result payloads.

use crate::rooms::Room;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preview,
    Intermediate,
    Final,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Intermediate => "intermediate",
            Self::Final => "final",
        }
    }

    /// Overall pipeline progress when this stage completes.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Preview => 33,
            Self::Intermediate => 66,
            Self::Final => 100,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock breakdown of a stage run, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_detection_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postprocessing_seconds: Option<f64>,
    pub total_seconds: f64,
}

/// Result payload persisted (and pushed to clients) after each stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub job_id: String,
    pub stage: Stage,
    pub rooms: Vec<Room>,
    pub processing_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub timing_metrics: StageTimings,
}
