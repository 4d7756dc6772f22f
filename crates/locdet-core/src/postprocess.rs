//! Post-processing of raw model detections into validated room boundaries.
//!
//! Detections are filtered by confidence, checked for a well-formed bounding
//! box (and optionally against the image bounds), converted to the requested
//! output format, and finally de-duplicated by IoU overlap.

use crate::rooms::{room_id, Room};
use serde::{Deserialize, Serialize};

/// IoU above which two rooms are considered the same detection.
const OVERLAP_IOU: f64 = 0.5;

// ---------------------------------------------------------------------------
// Model output types
// ---------------------------------------------------------------------------

/// One raw detection as returned by a detector endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub bbox: Vec<f64>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_hint: Option<String>,
    /// Precise boundary vertices, present only for models trained to emit them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Bounding boxes with rectangular polygons.
    #[default]
    Mvp,
    /// Precise polygon vertices where available, bbox rectangle otherwise.
    Growth,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mvp => "mvp",
            Self::Growth => "growth",
        }
    }
}

// ---------------------------------------------------------------------------
// Options / summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PostprocessOptions {
    pub output_format: OutputFormat,
    pub confidence_threshold: f64,
    pub image_width: Option<f64>,
    pub image_height: Option<f64>,
    pub filter_overlaps: bool,
}

impl Default for PostprocessOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Mvp,
            confidence_threshold: 0.7,
            image_width: None,
            image_height: None,
            filter_overlaps: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub rooms: Vec<Room>,
    pub detection_count: usize,
    pub output_format: OutputFormat,
    pub confidence_threshold: f64,
    /// Detections dropped by confidence, validation, or overlap filtering.
    pub filtered_count: usize,
}

// ---------------------------------------------------------------------------
// Postprocess
// ---------------------------------------------------------------------------

pub fn postprocess(detections: &[Detection], opts: &PostprocessOptions) -> DetectionSummary {
    let mut rooms = Vec::new();

    for (idx, det) in detections.iter().enumerate() {
        if det.confidence < opts.confidence_threshold {
            tracing::debug!(
                detection = idx,
                confidence = det.confidence,
                threshold = opts.confidence_threshold,
                "skipping low-confidence detection"
            );
            continue;
        }

        let Some(bbox) = validated_bbox(det, idx, opts) else {
            continue;
        };

        let polygon = match opts.output_format {
            OutputFormat::Mvp => Room::rectangle_polygon(&bbox),
            OutputFormat::Growth => growth_polygon(det, &bbox, opts),
        };

        rooms.push(Room {
            id: room_id(idx),
            bounding_box: bbox,
            polygon: Some(polygon),
            name_hint: det.name_hint.clone(),
            confidence: det.confidence,
        });
    }

    if opts.filter_overlaps && rooms.len() > 1 {
        rooms = filter_overlapping(rooms);
    }

    DetectionSummary {
        filtered_count: detections.len() - rooms.len(),
        detection_count: rooms.len(),
        output_format: opts.output_format,
        confidence_threshold: opts.confidence_threshold,
        rooms,
    }
}

/// Validate bbox shape, coordinate order, and (optionally) image bounds.
fn validated_bbox(det: &Detection, idx: usize, opts: &PostprocessOptions) -> Option<[f64; 4]> {
    if det.bbox.len() < 4 || det.bbox.iter().take(4).any(|v| !v.is_finite()) {
        tracing::warn!(detection = idx, "invalid bounding box shape");
        return None;
    }
    let bbox = [det.bbox[0], det.bbox[1], det.bbox[2], det.bbox[3]];
    let [x_min, y_min, x_max, y_max] = bbox;
    if x_min >= x_max || y_min >= y_max {
        tracing::warn!(detection = idx, "degenerate bounding box coordinates");
        return None;
    }
    if let (Some(w), Some(h)) = (opts.image_width, opts.image_height) {
        if x_min < 0.0 || y_min < 0.0 || x_max > w || y_max > h {
            tracing::warn!(detection = idx, "bounding box outside image bounds");
            return None;
        }
    }
    Some(bbox)
}

/// Use precise vertices when the model emitted a valid set, the bbox
/// rectangle otherwise.
fn growth_polygon(det: &Detection, bbox: &[f64; 4], opts: &PostprocessOptions) -> Vec<[f64; 2]> {
    let Some(vertices) = &det.vertices else {
        return Room::rectangle_polygon(bbox);
    };
    if vertices.len() < 3 {
        return Room::rectangle_polygon(bbox);
    }
    let in_bounds = |v: &[f64; 2]| match (opts.image_width, opts.image_height) {
        (Some(w), Some(h)) => v[0] >= 0.0 && v[0] <= w && v[1] >= 0.0 && v[1] <= h,
        _ => true,
    };
    if vertices.iter().all(|v| v[0].is_finite() && v[1].is_finite() && in_bounds(v)) {
        vertices.clone()
    } else {
        tracing::warn!("invalid vertices, falling back to bounding box polygon");
        Room::rectangle_polygon(bbox)
    }
}

/// Drop rooms overlapping a higher-confidence room with IoU > 0.5.
fn filter_overlapping(rooms: Vec<Room>) -> Vec<Room> {
    let mut sorted = rooms;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Room> = Vec::with_capacity(sorted.len());
    for room in sorted {
        let overlaps = kept
            .iter()
            .any(|existing| iou(&room.bounding_box, &existing.bounding_box) > OVERLAP_IOU);
        if overlaps {
            tracing::debug!(room = %room.id, "dropping overlapping detection");
        } else {
            kept.push(room);
        }
    }
    kept
}

/// Intersection-over-union of two `[x_min, y_min, x_max, y_max]` boxes.
pub fn iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let ix_min = a[0].max(b[0]);
    let iy_min = a[1].max(b[1]);
    let ix_max = a[2].min(b[2]);
    let iy_max = a[3].min(b[3]);
    if ix_min >= ix_max || iy_min >= iy_max {
        return 0.0;
    }
    let inter = (ix_max - ix_min) * (iy_max - iy_min);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: &[f64], confidence: f64) -> Detection {
        Detection {
            bbox: bbox.to_vec(),
            confidence,
            name_hint: None,
            vertices: None,
        }
    }

    #[test]
    fn low_confidence_detections_are_dropped() {
        let detections = vec![
            det(&[0.0, 0.0, 10.0, 10.0], 0.9),
            det(&[20.0, 20.0, 30.0, 30.0], 0.3),
        ];
        let summary = postprocess(&detections, &PostprocessOptions::default());
        assert_eq!(summary.rooms.len(), 1);
        assert_eq!(summary.filtered_count, 1);
        assert_eq!(summary.detection_count, 1);
    }

    #[test]
    fn malformed_bboxes_are_dropped() {
        let detections = vec![
            det(&[0.0, 0.0, 10.0], 0.9),          // too short
            det(&[10.0, 0.0, 5.0, 10.0], 0.9),    // x_min >= x_max
            det(&[0.0, 0.0, 10.0, 10.0], 0.9),    // valid
        ];
        let summary = postprocess(&detections, &PostprocessOptions::default());
        assert_eq!(summary.rooms.len(), 1);
        assert_eq!(summary.rooms[0].bounding_box, [0.0, 0.0, 10.0, 10.0]);
    }

    #[test]
    fn out_of_bounds_boxes_are_dropped_when_dims_known() {
        let opts = PostprocessOptions {
            image_width: Some(100.0),
            image_height: Some(100.0),
            ..Default::default()
        };
        let detections = vec![
            det(&[0.0, 0.0, 150.0, 50.0], 0.9),
            det(&[0.0, 0.0, 50.0, 50.0], 0.9),
        ];
        let summary = postprocess(&detections, &opts);
        assert_eq!(summary.rooms.len(), 1);
        assert_eq!(summary.rooms[0].bounding_box[2], 50.0);
    }

    #[test]
    fn mvp_polygon_is_the_bbox_rectangle() {
        let detections = vec![det(&[0.0, 0.0, 10.0, 20.0], 0.9)];
        let summary = postprocess(&detections, &PostprocessOptions::default());
        let poly = summary.rooms[0].polygon.as_ref().unwrap();
        assert_eq!(poly, &Room::rectangle_polygon(&[0.0, 0.0, 10.0, 20.0]));
    }

    #[test]
    fn growth_uses_vertices_when_valid() {
        let mut d = det(&[0.0, 0.0, 10.0, 10.0], 0.9);
        d.vertices = Some(vec![[0.0, 0.0], [10.0, 0.0], [8.0, 9.0]]);
        let opts = PostprocessOptions {
            output_format: OutputFormat::Growth,
            ..Default::default()
        };
        let summary = postprocess(&[d], &opts);
        assert_eq!(summary.rooms[0].polygon.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn growth_falls_back_on_bad_vertices() {
        let mut d = det(&[0.0, 0.0, 10.0, 10.0], 0.9);
        d.vertices = Some(vec![[0.0, 0.0], [10.0, 0.0]]); // fewer than 3
        let opts = PostprocessOptions {
            output_format: OutputFormat::Growth,
            ..Default::default()
        };
        let summary = postprocess(&[d], &opts);
        assert_eq!(summary.rooms[0].polygon.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn growth_rejects_out_of_bounds_vertices() {
        let mut d = det(&[0.0, 0.0, 10.0, 10.0], 0.9);
        d.vertices = Some(vec![[0.0, 0.0], [200.0, 0.0], [8.0, 9.0]]);
        let opts = PostprocessOptions {
            output_format: OutputFormat::Growth,
            image_width: Some(100.0),
            image_height: Some(100.0),
            ..Default::default()
        };
        let summary = postprocess(&[d], &opts);
        // Fell back to the bbox rectangle.
        assert_eq!(summary.rooms[0].polygon.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn overlapping_rooms_keep_highest_confidence() {
        let detections = vec![
            det(&[0.0, 0.0, 100.0, 100.0], 0.8),
            det(&[5.0, 5.0, 105.0, 105.0], 0.95), // heavy overlap, higher confidence
            det(&[500.0, 500.0, 600.0, 600.0], 0.75),
        ];
        let summary = postprocess(&detections, &PostprocessOptions::default());
        assert_eq!(summary.rooms.len(), 2);
        assert!(summary.rooms.iter().any(|r| r.confidence == 0.95));
        assert!(summary.rooms.iter().all(|r| r.confidence != 0.8));
    }

    #[test]
    fn overlap_filter_can_be_disabled() {
        let opts = PostprocessOptions {
            filter_overlaps: false,
            ..Default::default()
        };
        let detections = vec![
            det(&[0.0, 0.0, 100.0, 100.0], 0.8),
            det(&[5.0, 5.0, 105.0, 105.0], 0.95),
        ];
        let summary = postprocess(&detections, &opts);
        assert_eq!(summary.rooms.len(), 2);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(
            iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&b, &b) - 1.0).abs() < 1e-9);
    }
}
