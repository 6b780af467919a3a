use serde::{Deserialize, Serialize};
use crate::common::{PunchError, Result};
use crate::core::descriptor::FaceDescriptor;

/// Distance below which two descriptors are the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub distance: f32,
    pub matched: bool,
    pub confidence_percent: f32,
}

impl MatchResult {
    pub fn from_distance(distance: f32, threshold: f32) -> Self {
        let confidence = ((1.0 - distance / threshold) * 100.0).clamp(0.0, 100.0);
        Self {
            distance,
            matched: distance < threshold,
            confidence_percent: confidence,
        }
    }

    /// Whole-percent confidence for display.
    pub fn confidence_rounded(&self) -> u8 {
        self.confidence_percent.round() as u8
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(PunchError::InvalidInput(format!(
            "Descriptor length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum();

    Ok(sum.sqrt() as f32)
}

/// Compare a live descriptor with the enrolled one.
///
/// The confidence is reported whether or not the faces matched, so a near
/// miss can be shown to the user.
pub fn match_descriptors(
    live: &FaceDescriptor,
    enrolled: &FaceDescriptor,
    threshold: f32,
) -> Result<MatchResult> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(PunchError::InvalidInput(format!(
            "Match threshold must be positive, got {}",
            threshold
        )));
    }

    let distance = euclidean_distance(live.as_slice(), enrolled.as_slice())?;
    let result = MatchResult::from_distance(distance, threshold);

    tracing::debug!(
        "Descriptor distance {:.4} (threshold {:.2}): matched={} confidence={:.1}%",
        result.distance,
        threshold,
        result.matched,
        result.confidence_percent
    );

    Ok(result)
}
