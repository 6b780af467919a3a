use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use crate::biometrics::SharedEmbedder;
use crate::camera::{CameraDevice, Facing, Frame, StreamRequest, VideoStream};
use crate::common::{CameraError, Config, PunchError, Result};
use crate::core::quality::{self, QualityReport};

#[derive(Debug, Default)]
struct Counters {
    samples: AtomicU64,
    skipped_ticks: AtomicU64,
    errors: AtomicU64,
}

/// Sampling loop counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerStats {
    pub samples: u64,
    pub skipped_ticks: u64,
    pub errors: u64,
}

/// One open camera stream plus its quality sampling loop.
///
/// The stream never outlives the session: `close` is idempotent and also
/// runs on drop.
pub struct CaptureSession {
    stream: Arc<dyn VideoStream>,
    sampler: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
    reports: watch::Receiver<QualityReport>,
    counters: Arc<Counters>,
    mirror: bool,
    live_min_quality: u8,
}

impl CaptureSession {
    pub async fn open(camera: &dyn CameraDevice, embedder: SharedEmbedder, config: &Config) -> Result<Self> {
        let request = StreamRequest::from_config(&config.camera);
        let stream = camera.open(&request).await.map_err(|e| {
            tracing::warn!("Camera open failed: {}", e);
            PunchError::Camera(e)
        })?;
        tracing::info!(
            "Capture session opened ({}x{}, {:?})",
            request.width,
            request.height,
            request.facing
        );

        let (tx, rx) = watch::channel(QualityReport::no_face());
        let closed = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let period = Duration::from_millis(config.capture.sample_interval_ms);

        let sampler = tokio::spawn(sample_loop(
            stream.clone(),
            embedder,
            tx,
            closed.clone(),
            counters.clone(),
            period,
        ));

        Ok(Self {
            stream,
            sampler: Mutex::new(Some(sampler)),
            closed,
            reports: rx,
            counters,
            mirror: request.facing == Facing::User,
            live_min_quality: config.capture.live_min_quality,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<QualityReport> {
        self.reports.clone()
    }

    pub fn latest_report(&self) -> QualityReport {
        self.reports.borrow().clone()
    }

    /// Whether manual capture should be enabled.
    pub fn is_ready(&self) -> bool {
        self.is_open() && self.latest_report().meets_minimum(self.live_min_quality)
    }

    pub fn live_min_quality(&self) -> u8 {
        self.live_min_quality
    }

    /// Freeze the frame currently in the preview, mirrored like the preview
    /// for a front camera.
    pub fn capture_still(&self) -> Result<Frame> {
        if !self.is_open() {
            return Err(CameraError::Unavailable("capture session is closed".to_string()).into());
        }
        let frame = self
            .stream
            .latest_frame()
            .ok_or_else(|| CameraError::Unavailable("no frame available yet".to_string()))?;

        if self.mirror {
            Ok(Arc::new(frame.fliph()))
        } else {
            Ok(frame)
        }
    }

    /// Wait until the live report reaches the capture threshold.
    pub async fn wait_until_ready(&self, limit: Duration) -> Result<QualityReport> {
        let mut reports = self.subscribe();
        let min = self.live_min_quality;

        let wait = async {
            loop {
                {
                    let report = reports.borrow_and_update();
                    if report.meets_minimum(min) {
                        return Ok(report.clone());
                    }
                }
                if reports.changed().await.is_err() {
                    return Err(PunchError::from(CameraError::Unavailable(
                        "capture session is closed".to_string(),
                    )));
                }
            }
        };

        match tokio::time::timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => {
                let last = self.latest_report();
                if last.face_detected() {
                    Err(PunchError::LowQuality { score: last.overall_score, required: min })
                } else {
                    Err(PunchError::NoFaceDetected)
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            samples: self.counters.samples.load(Ordering::SeqCst),
            skipped_ticks: self.counters.skipped_ticks.load(Ordering::SeqCst),
            errors: self.counters.errors.load(Ordering::SeqCst),
        }
    }

    /// Cancel the sampling loop and stop the camera.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(sampler) = self.sampler.lock().ok().and_then(|mut s| s.take()) {
            sampler.abort();
        }
        self.stream.stop();

        let stats = self.stats();
        tracing::info!(
            "Capture session closed ({} samples, {} skipped ticks, {} errors)",
            stats.samples,
            stats.skipped_ticks,
            stats.errors
        );
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn sample_loop(
    stream: Arc<dyn VideoStream>,
    embedder: SharedEmbedder,
    reports: watch::Sender<QualityReport>,
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
    period: Duration,
) {
    // Analysis runs inline, so ticks never overlap; ticks that pass while a
    // slow analysis is running are dropped rather than queued.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if closed.load(Ordering::SeqCst) {
            break;
        }
        let Some(frame) = stream.latest_frame() else {
            continue;
        };

        let started = Instant::now();
        let (width, height) = (frame.width(), frame.height());
        let detection = embedder.detect_face(frame).await;

        if closed.load(Ordering::SeqCst) {
            break;
        }
        match detection {
            Ok(detection) => {
                let report = quality::score(detection.as_ref(), width, height);
                reports.send_replace(report);
                counters.samples.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::warn!("Quality sample failed: {}", e);
                counters.errors.fetch_add(1, Ordering::SeqCst);
            }
        }

        let took = started.elapsed();
        if took > period {
            let missed = (took.as_millis() / period.as_millis().max(1)) as u64;
            counters.skipped_ticks.fetch_add(missed, Ordering::SeqCst);
            tracing::debug!("Quality sample took {:?}, skipped {} ticks", took, missed);
        }
    }
}
