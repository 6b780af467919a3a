use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;
use crate::common::{DevMode, Result};
use crate::core::detection::Detection;

/// Dev-mode archive of captured stills and annotated debug copies.
#[derive(Debug, Clone)]
pub struct CaptureArchive {
    dev_mode: DevMode,
}

impl CaptureArchive {
    pub fn new(dev_mode: DevMode) -> Self {
        Self { dev_mode }
    }

    pub fn is_enabled(&self) -> bool {
        self.dev_mode.is_enabled()
    }

    /// Save a still; returns where it went, or `None` outside dev mode.
    pub fn save_still(&self, prefix: &str, image: &DynamicImage) -> Result<Option<PathBuf>> {
        let Some(path) = self.dev_mode.get_capture_path(prefix) else {
            return Ok(None);
        };
        image.to_rgb8().save(&path)?;
        tracing::debug!("Saved capture to {}", path.display());
        Ok(Some(path))
    }

    /// Save a copy with the detection box drawn on it.
    pub fn save_annotated(&self, prefix: &str, image: &DynamicImage, detection: Option<&Detection>) -> Result<Option<PathBuf>> {
        let Some(path) = self.dev_mode.get_debug_path(prefix) else {
            return Ok(None);
        };

        let mut canvas = image.to_rgb8();
        if let Some(detection) = detection {
            let bbox = detection.bbox.clamp_to(canvas.width(), canvas.height());
            if !bbox.is_degenerate() {
                let color = if detection.confidence >= 0.5 { Rgb([0, 255, 0]) } else { Rgb([255, 165, 0]) };
                let rect = Rect::at(bbox.x as i32, bbox.y as i32)
                    .of_size(bbox.width.max(1.0) as u32, bbox.height.max(1.0) as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
        }

        canvas.save(&path)?;
        tracing::debug!("Saved annotated capture to {}", path.display());
        Ok(Some(path))
    }

    /// Best-effort: archive failures are logged, never surfaced.
    pub fn record(&self, prefix: &str, image: &DynamicImage, detection: Option<&Detection>) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.save_still(prefix, image) {
            tracing::warn!("Failed to save capture: {}", e);
        }
        if let Err(e) = self.save_annotated(prefix, image, detection) {
            tracing::warn!("Failed to save annotated capture: {}", e);
        }
    }
}
