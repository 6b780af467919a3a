pub mod session;
pub mod still;
#[cfg(feature = "v4l-camera")]
pub mod v4l2;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::common::config::CameraConfig;
use crate::common::CameraError;

pub use session::{CaptureSession, SamplerStats};
pub use still::StillImageCamera;
#[cfg(feature = "v4l-camera")]
pub use v4l2::V4lCamera;

/// One decoded video frame. Shared, never mutated.
pub type Frame = Arc<DynamicImage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front camera; previews and stills are mirrored.
    #[default]
    User,
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
}

impl StreamRequest {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            facing: config.facing,
            width: config.width,
            height: config.height,
        }
    }
}

/// A running camera stream. Stopping releases the hardware.
pub trait VideoStream: Send + Sync {
    /// The frame currently shown in the preview, if one has arrived.
    fn latest_frame(&self) -> Option<Frame>;

    /// Stop all tracks. Safe to call more than once.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<Arc<dyn VideoStream>, CameraError>;
}

pub type SharedCamera = Arc<dyn CameraDevice>;
