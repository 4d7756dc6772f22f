//! Wire types for the analyzer and detector HTTP APIs.

use locdet_core::analysis::{AnalysisMetadata, BoundingBox, Geometry};
use locdet_core::postprocess::Detection;
use locdet_core::rooms::Room;
use serde::{Deserialize, Serialize};

// ─── Analyzer wire format ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    /// Base64-encoded document bytes.
    pub document: String,
    pub format: String,
    pub features: Vec<String>,
}

/// Raw block as the analyzer returns it; the client partitions these into
/// text vs layout blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    #[serde(default)]
    pub id: String,
    pub block_type: RawBlockType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub geometry: RawGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawBlockType {
    Word,
    Line,
    Page,
    Table,
    Cell,
    SelectionElement,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawGeometry {
    #[serde(default)]
    pub bounding_box: Option<RawBoundingBox>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawBoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl From<RawGeometry> for Geometry {
    fn from(raw: RawGeometry) -> Self {
        Geometry {
            bounding_box: raw.bounding_box.map(|b| BoundingBox {
                left: b.left,
                top: b.top,
                width: b.width,
                height: b.height,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponseMetadata {
    #[serde(default = "one")]
    pub pages: u32,
    #[serde(default)]
    pub image_width: Option<f64>,
    #[serde(default)]
    pub image_height: Option<f64>,
}

fn one() -> u32 {
    1
}

impl Default for AnalyzeResponseMetadata {
    fn default() -> Self {
        Self {
            pages: one(),
            image_width: None,
            image_height: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub blocks: Vec<RawBlock>,
    #[serde(default)]
    pub metadata: AnalyzeResponseMetadata,
}

impl AnalyzeResponseMetadata {
    pub fn into_metadata(self) -> AnalysisMetadata {
        AnalysisMetadata {
            pages: self.pages,
            analyzed_at: chrono::Utc::now(),
            image_width: self.image_width,
            image_height: self.image_height,
        }
    }
}

// ─── Detector wire format ─────────────────────────────────────────────────

/// Model input assembled from analysis results and, for the final stage,
/// the intermediate rooms to refine.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInput {
    pub text_blocks: Vec<locdet_core::analysis::TextBlock>,
    pub layout_blocks: Vec<locdet_core::analysis::LayoutBlock>,
    pub metadata: AnalysisMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_rooms: Option<Vec<Room>>,
}

impl ModelInput {
    pub fn from_analysis(analysis: &locdet_core::analysis::AnalysisResult) -> Self {
        Self {
            text_blocks: analysis.text_blocks.clone(),
            layout_blocks: analysis.layout_blocks.clone(),
            metadata: analysis.metadata.clone(),
            intermediate_rooms: None,
        }
    }

    pub fn with_intermediate_rooms(mut self, rooms: Vec<Room>) -> Self {
        self.intermediate_rooms = Some(rooms);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<Detection>,
}
