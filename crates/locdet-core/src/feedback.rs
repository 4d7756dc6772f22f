use crate::error::{DetectError, Result};
use crate::ids;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FeedbackKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Wrong,
    Correct,
    Partial,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrong => "wrong",
            Self::Correct => "correct",
            Self::Partial => "partial",
        }
    }
}

// ---------------------------------------------------------------------------
// Correction / Feedback
// ---------------------------------------------------------------------------

/// A corrected room boundary supplied with `wrong` feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub bounding_box: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// User feedback on the detection results of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback_id: String,
    pub job_id: String,
    pub feedback: FeedbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(
        job_id: impl Into<String>,
        feedback: FeedbackKind,
        room_id: Option<String>,
        correction: Option<Correction>,
    ) -> Self {
        Self {
            feedback_id: ids::generate_feedback_id(),
            job_id: job_id.into(),
            feedback,
            room_id,
            correction,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.feedback_id.starts_with("fb_") {
            return Err(DetectError::InvalidFeedback(format!(
                "feedback_id must start with 'fb_': {}",
                self.feedback_id
            )));
        }
        match (&self.feedback, &self.correction) {
            // Wrong feedback must carry a usable correction.
            (FeedbackKind::Wrong, None) => Err(DetectError::InvalidFeedback(
                "correction is required when feedback type is 'wrong'".to_string(),
            )),
            (FeedbackKind::Wrong, Some(c)) if c.bounding_box.len() != 4 => {
                Err(DetectError::InvalidFeedback(
                    "correction bounding_box must be an array of 4 numbers".to_string(),
                ))
            }
            (FeedbackKind::Wrong, Some(c)) if c.bounding_box.iter().any(|v| !v.is_finite()) => {
                Err(DetectError::InvalidFeedback(
                    "correction bounding_box must contain only finite numbers".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_feedback_needs_no_correction() {
        let fb = Feedback::new("job_1", FeedbackKind::Correct, None, None);
        assert!(fb.validate().is_ok());
        assert!(fb.feedback_id.starts_with("fb_"));
    }

    #[test]
    fn wrong_feedback_requires_correction() {
        let fb = Feedback::new("job_1", FeedbackKind::Wrong, Some("room_001".into()), None);
        assert!(matches!(
            fb.validate(),
            Err(DetectError::InvalidFeedback(_))
        ));
    }

    #[test]
    fn wrong_feedback_requires_four_coords() {
        let fb = Feedback::new(
            "job_1",
            FeedbackKind::Wrong,
            None,
            Some(Correction {
                bounding_box: vec![0.0, 0.0, 100.0],
                name: None,
            }),
        );
        assert!(fb.validate().is_err());

        let fb = Feedback::new(
            "job_1",
            FeedbackKind::Wrong,
            None,
            Some(Correction {
                bounding_box: vec![0.0, 0.0, 100.0, 100.0],
                name: Some("Kitchen".into()),
            }),
        );
        assert!(fb.validate().is_ok());
    }

    #[test]
    fn wrong_feedback_rejects_non_finite_coords() {
        let fb = Feedback::new(
            "job_1",
            FeedbackKind::Wrong,
            None,
            Some(Correction {
                bounding_box: vec![0.0, f64::NAN, 100.0, 100.0],
                name: None,
            }),
        );
        assert!(fb.validate().is_err());
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&FeedbackKind::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
        let back: FeedbackKind = serde_json::from_str("\"wrong\"").unwrap();
        assert_eq!(back, FeedbackKind::Wrong);
    }
}
