use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use crate::biometrics::Biometrics;
use crate::camera::{CameraDevice, CaptureSession, Frame};
use crate::common::{Config, PunchError, Result};
use crate::core::descriptor::FaceDescriptor;
use crate::core::detection::DetectionBox;
use crate::core::quality::{self, QualityReport};
use crate::storage::CaptureArchive;

/// What the profile page persists after enrollment.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub cropped_image: DynamicImage,
    pub descriptor: FaceDescriptor,
    pub quality: QualityReport,
}

pub struct Enroller {
    biometrics: Biometrics,
    config: Config,
    archive: Option<CaptureArchive>,
}

impl Enroller {
    pub fn new(biometrics: Biometrics, config: Config) -> Self {
        Self { biometrics, config, archive: None }
    }

    pub fn with_archive(mut self, archive: CaptureArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Derive a descriptor and a profile crop from one still.
    pub async fn enroll(&self, still: Frame) -> Result<Enrollment> {
        let embedder = self.biometrics.acquire().await?;
        let analysis = embedder.detect_single_face(still.clone()).await?;

        if let Some(archive) = &self.archive {
            archive.record("enroll", &still, analysis.as_ref().map(|a| &a.detection));
        }

        let analysis = analysis.ok_or(PunchError::NoFaceDetected)?;
        let report = quality::score(Some(&analysis.detection), still.width(), still.height());
        let required = self.config.enrollment.min_quality;
        if !report.meets_minimum(required) {
            tracing::info!("Enrollment still rejected: {}", report.summary());
            return Err(PunchError::LowQuality { score: report.overall_score, required });
        }

        let cropped_image = crop_face(
            &still,
            &analysis.detection.bbox,
            self.config.enrollment.crop_margin,
            self.config.enrollment.crop_size,
        )?;

        tracing::info!("Enrollment accepted ({}%)", report.overall_score);
        Ok(Enrollment {
            cropped_image,
            descriptor: analysis.descriptor,
            quality: report,
        })
    }

    /// Wait for a capture-eligible face on the live camera, then enroll it.
    pub async fn capture_from_camera(&self, camera: &dyn CameraDevice) -> Result<Enrollment> {
        let embedder = self.biometrics.acquire().await?;
        let session = CaptureSession::open(camera, embedder, &self.config).await?;
        let limit = Duration::from_secs(self.config.enrollment.camera_timeout_secs);

        let still = match session.wait_until_ready(limit).await {
            Ok(report) => {
                tracing::debug!("Live face ready: {}", report.summary());
                session.capture_still()
            }
            Err(e) => Err(e),
        };
        session.close();

        self.enroll(still?).await
    }
}

/// Square crop around the face, grown by `margin` and clamped to the image.
pub fn crop_face(image: &DynamicImage, bbox: &DetectionBox, margin: f32, size: u32) -> Result<DynamicImage> {
    let (width, height) = (image.width(), image.height());
    let side = (bbox.width.max(bbox.height) * margin)
        .min(width as f32)
        .min(height as f32)
        .floor();
    if side < 1.0 {
        return Err(PunchError::InvalidInput("face box is empty".to_string()));
    }

    let (cx, cy) = bbox.center();
    let x = (cx - side / 2.0).clamp(0.0, width as f32 - side) as u32;
    let y = (cy - side / 2.0).clamp(0.0, height as f32 - side) as u32;
    let side = side as u32;

    Ok(image.crop_imm(x, y, side, side).resize_exact(size, size, FilterType::Triangle))
}

/// Load a still from disk as a frame.
pub fn load_still(path: &std::path::Path) -> Result<Frame> {
    Ok(Arc::new(image::open(path)?))
}
