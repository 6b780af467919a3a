//! Fakes shared by the unit tests.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use crate::biometrics::EmbeddingService;
use crate::camera::Frame;
use crate::common::{PunchError, Result};
use crate::core::descriptor::{FaceDescriptor, DESCRIPTOR_LEN};
use crate::core::detection::{Detection, DetectionBox, FaceAnalysis};

pub fn descriptor(offset: f32) -> FaceDescriptor {
    let mut values = vec![0.0f32; DESCRIPTOR_LEN];
    values[0] = offset;
    FaceDescriptor::new(values).unwrap()
}

pub fn centered_face(width: u32, height: u32, confidence: f32) -> Detection {
    let side = width.min(height) as f32 * 0.6;
    Detection::new(
        DetectionBox::from_center(width as f32 / 2.0, height as f32 / 2.0, side, side),
        confidence,
    )
}

/// Left half red, right half blue.
pub fn split_frame(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    DynamicImage::ImageRgb8(image)
}

/// Returns whatever face it was told to, after an optional delay.
#[derive(Default)]
pub struct ScriptedEmbedder {
    pub detection: Mutex<Option<Detection>>,
    pub descriptor: Mutex<Option<FaceDescriptor>>,
    /// Error returned by the next `detect_single_face` call only.
    pub fail_next: Mutex<Option<String>>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn seeing(detection: Option<Detection>, descriptor: Option<FaceDescriptor>) -> Self {
        Self {
            detection: Mutex::new(detection),
            descriptor: Mutex::new(descriptor),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_descriptor(&self, descriptor: Option<FaceDescriptor>) {
        *self.descriptor.lock().unwrap() = descriptor;
    }

    pub fn failing_once(self, reason: &str) -> Self {
        *self.fail_next.lock().unwrap() = Some(reason.to_string());
        self
    }

    async fn busy(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingService for ScriptedEmbedder {
    async fn detect_face(&self, _frame: Frame) -> Result<Option<Detection>> {
        self.busy().await;
        Ok(*self.detection.lock().unwrap())
    }

    async fn detect_single_face(&self, _frame: Frame) -> Result<Option<FaceAnalysis>> {
        self.busy().await;
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(PunchError::Model(reason));
        }
        let detection = *self.detection.lock().unwrap();
        let descriptor = self.descriptor.lock().unwrap().clone();
        Ok(detection.zip(descriptor).map(|(detection, descriptor)| FaceAnalysis { detection, descriptor }))
    }
}
