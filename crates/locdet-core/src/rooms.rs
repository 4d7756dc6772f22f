//! Fast preview room detection over layout-analysis results.
//!
//! Table blocks are the strongest signal for room boundaries on a blueprint;
//! the page outline and finally the whole canvas serve as fallbacks so the
//! preview never returns an empty room list.

use crate::analysis::{AnalysisResult, LayoutKind, TextBlock};
use serde::{Deserialize, Serialize};

/// Canvas the normalized analyzer coordinates are scaled onto when the
/// blueprint's pixel dimensions are unknown.
pub const DEFAULT_CANVAS: f64 = 1000.0;

const TABLE_CONFIDENCE: f64 = 0.75;
const PAGE_CONFIDENCE: f64 = 0.6;
const FALLBACK_CONFIDENCE: f64 = 0.5;

const ROOM_KEYWORDS: [&str; 17] = [
    "room", "bedroom", "bathroom", "kitchen", "living", "dining", "hall", "entry", "office",
    "study", "garage", "basement", "attic", "closet", "pantry", "laundry", "utility",
];

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One detected room, in pixel coordinates `[x_min, y_min, x_max, y_max]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub bounding_box: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<[f64; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_hint: Option<String>,
    pub confidence: f64,
}

impl Room {
    pub fn area(&self) -> f64 {
        let [x_min, y_min, x_max, y_max] = self.bounding_box;
        (x_max - x_min).max(0.0) * (y_max - y_min).max(0.0)
    }

    /// Axis-aligned rectangle polygon for the bounding box.
    pub fn rectangle_polygon(bbox: &[f64; 4]) -> Vec<[f64; 2]> {
        let [x_min, y_min, x_max, y_max] = *bbox;
        vec![
            [x_min, y_min],
            [x_max, y_min],
            [x_max, y_max],
            [x_min, y_max],
        ]
    }
}

pub fn room_id(index: usize) -> String {
    format!("room_{:03}", index + 1)
}

// ---------------------------------------------------------------------------
// Preview detection
// ---------------------------------------------------------------------------

/// Detect rooms using lightweight layout heuristics.
///
/// Table blocks become room candidates; if none exist the page block is used
/// as a single room, and a full-canvas room is the last resort.
pub fn detect_rooms(analysis: &AnalysisResult) -> Vec<Room> {
    let mut rooms = Vec::new();

    let tables = analysis
        .layout_blocks
        .iter()
        .filter(|b| b.kind == LayoutKind::Table);

    for (idx, block) in tables.enumerate() {
        if let Some(bbox) = block.geometry.bounding_box {
            let scaled = scale_to_canvas(bbox.left, bbox.top, bbox.width, bbox.height);
            rooms.push(Room {
                id: room_id(idx),
                name_hint: name_hint_within(&analysis.text_blocks, &scaled),
                bounding_box: scaled,
                polygon: None,
                confidence: TABLE_CONFIDENCE,
            });
        }
    }

    if !rooms.is_empty() {
        return rooms;
    }

    // No table blocks: fall back to the page outline.
    let page = analysis
        .layout_blocks
        .iter()
        .find(|b| b.kind == LayoutKind::Page)
        .and_then(|b| b.geometry.bounding_box);

    if let Some(bbox) = page {
        let scaled = scale_to_canvas(bbox.left, bbox.top, bbox.width, bbox.height);
        return vec![Room {
            id: room_id(0),
            name_hint: name_hint_within(&analysis.text_blocks, &scaled),
            bounding_box: scaled,
            polygon: None,
            confidence: PAGE_CONFIDENCE,
        }];
    }

    // Last resort: one room covering the whole canvas, no name hint.
    vec![Room {
        id: room_id(0),
        bounding_box: [0.0, 0.0, DEFAULT_CANVAS, DEFAULT_CANVAS],
        polygon: None,
        name_hint: None,
        confidence: FALLBACK_CONFIDENCE,
    }]
}

fn scale_to_canvas(left: f64, top: f64, width: f64, height: f64) -> [f64; 4] {
    let x_min = (left * DEFAULT_CANVAS).floor();
    let y_min = (top * DEFAULT_CANVAS).floor();
    let x_max = ((left + width) * DEFAULT_CANVAS).floor();
    let y_max = ((top + height) * DEFAULT_CANVAS).floor();
    [x_min, y_min, x_max, y_max]
}

/// First text block inside the box whose text mentions a room keyword.
fn name_hint_within(text_blocks: &[TextBlock], bbox: &[f64; 4]) -> Option<String> {
    let [x_min, y_min, x_max, y_max] = *bbox;
    for block in text_blocks {
        let Some(geom) = block.geometry.bounding_box else {
            continue;
        };
        let text_x = geom.left * DEFAULT_CANVAS;
        let text_y = geom.top * DEFAULT_CANVAS;
        if text_x < x_min || text_x > x_max || text_y < y_min || text_y > y_max {
            continue;
        }
        let lower = block.text.to_lowercase();
        if ROOM_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return Some(block.text.trim().to_string());
        }
    }
    None
}
