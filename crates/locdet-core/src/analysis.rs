//! Layout-analysis result types shared between the analyzer client, the
//! detection pipeline, and the API surface.
//!
//! Coordinates in [`BoundingBox`] are normalized to 0..1 relative to the page;
//! pixel coordinates only appear after room detection scales them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    Page,
    Table,
    Cell,
    SelectionElement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBlock {
    pub id: String,
    pub kind: LayoutKind,
    #[serde(default)]
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub pages: u32,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<f64>,
}

impl Default for AnalysisMetadata {
    fn default() -> Self {
        Self {
            pages: 1,
            analyzed_at: Utc::now(),
            image_width: None,
            image_height: None,
        }
    }
}

/// Full layout-analysis result for one blueprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub text_blocks: Vec<TextBlock>,
    #[serde(default)]
    pub layout_blocks: Vec<LayoutBlock>,
    #[serde(default)]
    pub metadata: AnalysisMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_kind_snake_case() {
        let json = serde_json::to_string(&LayoutKind::SelectionElement).unwrap();
        assert_eq!(json, "\"selection_element\"");
    }

    #[test]
    fn analysis_roundtrip() {
        let result = AnalysisResult {
            text_blocks: vec![TextBlock {
                id: "t1".into(),
                text: "Kitchen".into(),
                geometry: Geometry {
                    bounding_box: Some(BoundingBox {
                        left: 0.1,
                        top: 0.2,
                        width: 0.05,
                        height: 0.02,
                    }),
                },
            }],
            layout_blocks: vec![LayoutBlock {
                id: "l1".into(),
                kind: LayoutKind::Table,
                geometry: Geometry::default(),
            }],
            metadata: AnalysisMetadata::default(),
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text_blocks.len(), 1);
        assert_eq!(back.layout_blocks[0].kind, LayoutKind::Table);
        assert_eq!(back.metadata.pages, 1);
    }

    #[test]
    fn missing_fields_default() {
        let back: AnalysisResult = serde_json::from_str("{}").unwrap();
        assert!(back.text_blocks.is_empty());
        assert!(back.layout_blocks.is_empty());
    }
}
