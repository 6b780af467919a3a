use async_trait::async_trait;
use image::DynamicImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use crate::camera::{CameraDevice, Frame, StreamRequest, VideoStream};
use crate::common::{CameraError, PunchError, Result};

const DEFAULT_FRAME_PERIOD: Duration = Duration::from_millis(100);

/// Camera that replays a fixed list of images, cycling through them.
///
/// Used for dev mode without a webcam and as the test double for the
/// capture pipeline.
pub struct StillImageCamera {
    frames: Arc<[Frame]>,
    frame_period: Duration,
    failure: Option<CameraError>,
    active: Arc<AtomicUsize>,
    opened: AtomicUsize,
}

impl StillImageCamera {
    pub fn from_images(images: Vec<DynamicImage>) -> Self {
        Self {
            frames: images.into_iter().map(Arc::new).collect(),
            frame_period: DEFAULT_FRAME_PERIOD,
            failure: None,
            active: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::from_images(vec![image::open(path)?]))
    }

    /// All `.jpg`/`.jpeg`/`.png` files in a directory, in name order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(PunchError::InvalidInput(format!(
                "No images found in {}",
                dir.display()
            )));
        }

        let images = paths
            .iter()
            .map(image::open)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::debug!("Loaded {} replay frames from {}", images.len(), dir.display());
        Ok(Self::from_images(images))
    }

    /// A camera whose `open` always fails with `error`.
    pub fn failing(error: CameraError) -> Self {
        Self { failure: Some(error), ..Self::from_images(Vec::new()) }
    }

    pub fn with_frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period.max(Duration::from_millis(1));
        self
    }

    /// Streams opened and not yet stopped.
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for StillImageCamera {
    async fn open(&self, request: &StreamRequest) -> std::result::Result<Arc<dyn VideoStream>, CameraError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if self.frames.is_empty() {
            return Err(CameraError::Unavailable("no frames to replay".to_string()));
        }

        tracing::debug!(
            "Opening replay camera ({} frames, requested {}x{} {:?})",
            self.frames.len(),
            request.width,
            request.height,
            request.facing
        );
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(StillStream {
            frames: self.frames.clone(),
            period: self.frame_period,
            started: Instant::now(),
            live: AtomicBool::new(true),
            active: self.active.clone(),
        }))
    }
}

struct StillStream {
    frames: Arc<[Frame]>,
    period: Duration,
    started: Instant,
    live: AtomicBool,
    active: Arc<AtomicUsize>,
}

impl VideoStream for StillStream {
    fn latest_frame(&self) -> Option<Frame> {
        if !self.is_live() {
            return None;
        }
        let ticks = self.started.elapsed().as_nanos() / self.period.as_nanos();
        let index = (ticks % self.frames.len() as u128) as usize;
        self.frames.get(index).cloned()
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for StillStream {
    fn drop(&mut self) {
        self.stop();
    }
}
