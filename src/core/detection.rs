use serde::{Deserialize, Serialize};
use crate::core::descriptor::FaceDescriptor;

/// Face bounding box in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectionBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x: x1, y: y1, width: x2 - x1, height: y2 - y1 }
    }

    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self { x: cx - width / 2.0, y: cy - height / 2.0, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Clip to an image of the given size.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Self {
        let x1 = self.x.clamp(0.0, image_width as f32);
        let y1 = self.y.clamp(0.0, image_height as f32);
        let x2 = self.right().clamp(0.0, image_width as f32);
        let y2 = self.bottom().clamp(0.0, image_height as f32);
        Self::from_corners(x1, y1, x2, y2)
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self { x: self.x * sx, y: self.y * sy, width: self.width * sx, height: self.height * sy }
    }

    /// Mirror horizontally inside an image of the given width.
    pub fn mirrored(&self, image_width: u32) -> Self {
        Self { x: image_width as f32 - self.right(), ..*self }
    }

    pub fn iou(&self, other: &DetectionBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One detector hit: where the face is and how sure the detector is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: DetectionBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: DetectionBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}

/// Full single-face analysis of a still: detection plus embedding.
#[derive(Debug, Clone)]
pub struct FaceAnalysis {
    pub detection: Detection,
    pub descriptor: FaceDescriptor,
}

/// Greedy non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if keep.iter().all(|kept| kept.bbox.iou(&candidate.bbox) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Reduce a detector's output to zero-or-one face: the most confident hit
/// above `min_confidence`.
pub fn best_detection(detections: Vec<Detection>, min_confidence: f32) -> Option<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= min_confidence && !d.bbox.is_degenerate())
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}
