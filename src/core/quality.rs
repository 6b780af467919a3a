use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::core::detection::Detection;

/// Default for `enrollment.min_quality`.
pub const ENROLLMENT_MIN_SCORE: u8 = 40;
/// Default for `capture.live_min_quality`.
pub const LIVE_MIN_SCORE: u8 = 50;

const DETECTION_WEIGHT: f32 = 0.5;
const SIZE_WEIGHT: f32 = 0.3;
const CENTER_WEIGHT: f32 = 0.2;

const IDEAL_SIZE_PERCENT: f32 = 15.0;
const ACCEPTABLE_SIZE_PERCENT: f32 = 5.0;
const CENTER_TOLERANCE: f32 = 0.25;
const MIN_CLEAR_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityCheck {
    FaceDetected,
    FaceSize,
    Centered,
    Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub pass: bool,
    pub message: String,
}

impl CheckOutcome {
    fn new(pass: bool, message: &str) -> Self {
        Self { pass, message: message.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub overall_score: u8,
    pub detection_score: f32,
    pub size_score: f32,
    pub center_score: f32,
    pub checks: BTreeMap<QualityCheck, CheckOutcome>,
}

/// Score one detection against the frame it came from.
///
/// Pure and cheap: it only looks at the box geometry and the detector
/// confidence, so it can run on every sampling tick.
pub fn score(detection: Option<&Detection>, image_width: u32, image_height: u32) -> QualityReport {
    let detection = match detection {
        Some(d) if image_width > 0 && image_height > 0 && !d.bbox.is_degenerate() => d,
        _ => return QualityReport::no_face(),
    };

    let img_w = image_width as f32;
    let img_h = image_height as f32;

    let detection_score = detection.confidence.clamp(0.0, 1.0) * 100.0;

    let size_percent = detection.bbox.area() / (img_w * img_h) * 100.0;
    let size_score = (size_percent * 5.0).min(100.0);
    let size_check = if size_percent >= IDEAL_SIZE_PERCENT {
        CheckOutcome::new(true, "good")
    } else if size_percent >= ACCEPTABLE_SIZE_PERCENT {
        CheckOutcome::new(true, "could be larger")
    } else {
        CheckOutcome::new(false, "too small")
    };

    let (face_cx, face_cy) = detection.bbox.center();
    let offset_x = (face_cx - img_w / 2.0).abs() / img_w;
    let offset_y = (face_cy - img_h / 2.0).abs() / img_h;
    let center_score = ((1.0 - (offset_x + offset_y) / 2.0) * 100.0).clamp(0.0, 100.0);
    let centered = offset_x < CENTER_TOLERANCE && offset_y < CENTER_TOLERANCE;
    let center_check = if centered {
        CheckOutcome::new(true, "centered")
    } else {
        CheckOutcome::new(false, "move to the center")
    };

    let confidence_check = if detection.confidence >= MIN_CLEAR_CONFIDENCE {
        CheckOutcome::new(true, "face clearly visible")
    } else {
        CheckOutcome::new(false, "face not clear")
    };

    let overall = DETECTION_WEIGHT * detection_score
        + SIZE_WEIGHT * size_score
        + CENTER_WEIGHT * center_score;

    let mut checks = BTreeMap::new();
    checks.insert(QualityCheck::FaceDetected, CheckOutcome::new(true, "face detected"));
    checks.insert(QualityCheck::FaceSize, size_check);
    checks.insert(QualityCheck::Centered, center_check);
    checks.insert(QualityCheck::Confidence, confidence_check);

    QualityReport {
        overall_score: overall.round().clamp(0.0, 100.0) as u8,
        detection_score,
        size_score,
        center_score,
        checks,
    }
}

impl QualityReport {
    pub fn no_face() -> Self {
        let checks = [
            QualityCheck::FaceDetected,
            QualityCheck::FaceSize,
            QualityCheck::Centered,
            QualityCheck::Confidence,
        ]
        .into_iter()
        .map(|check| (check, CheckOutcome::new(false, "no face detected")))
        .collect();

        Self {
            overall_score: 0,
            detection_score: 0.0,
            size_score: 0.0,
            center_score: 0.0,
            checks,
        }
    }

    pub fn face_detected(&self) -> bool {
        self.checks
            .get(&QualityCheck::FaceDetected)
            .map(|c| c.pass)
            .unwrap_or(false)
    }

    pub fn meets_minimum(&self, min_score: u8) -> bool {
        self.face_detected() && self.overall_score >= min_score
    }

    /// One-line prompt for the live preview.
    pub fn guidance(&self) -> &'static str {
        match self.overall_score {
            70..=100 => "Perfect! Capture now",
            50..=69 => "Good - You can capture",
            1..=49 => "Adjust your position",
            _ => "No face detected",
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}% (detection {:.0}, size {:.0}, center {:.0})",
            self.overall_score, self.detection_score, self.size_score, self.center_score
        )
    }

    pub fn failing_checks(&self) -> Vec<(QualityCheck, &str)> {
        self.checks
            .iter()
            .filter(|(_, outcome)| !outcome.pass)
            .map(|(check, outcome)| (*check, outcome.message.as_str()))
            .collect()
    }
}
