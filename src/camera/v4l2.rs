use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, Luma};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};
use crate::camera::{CameraDevice, Frame, StreamRequest, VideoStream};
use crate::common::CameraError;

/// Video4Linux webcam.
pub struct V4lCamera {
    device_index: u32,
    warmup_frames: u32,
}

impl V4lCamera {
    pub fn new(device_index: u32, warmup_frames: u32) -> Self {
        Self { device_index, warmup_frames }
    }
}

fn open_error(index: u32, e: io::Error) -> CameraError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        CameraError::PermissionDenied
    } else {
        CameraError::Unavailable(format!("Failed to open camera {}: {}", index, e))
    }
}

fn configure(index: u32, request: &StreamRequest) -> Result<(Device, v4l::Format), CameraError> {
    let device = Device::new(index as usize).map_err(|e| open_error(index, e))?;

    let caps = device
        .query_caps()
        .map_err(|e| CameraError::Unavailable(format!("Failed to query capabilities: {}", e)))?;
    if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
        tracing::warn!("Device {} ({}) may not support video capture", index, caps.card);
    }

    let mut fmt = device
        .format()
        .map_err(|e| CameraError::Unavailable(format!("Failed to get format: {}", e)))?;
    fmt.width = request.width;
    fmt.height = request.height;
    if fmt.fourcc != FourCC::new(b"GREY") {
        fmt.fourcc = FourCC::new(b"MJPG");
    }
    if let Err(e) = device.set_format(&fmt) {
        tracing::warn!("Could not set {}x{}: {}. Using device defaults.", fmt.width, fmt.height, e);
    }

    let actual = device
        .format()
        .map_err(|e| CameraError::Unavailable(format!("Failed to get final format: {}", e)))?;
    if actual.width != request.width || actual.height != request.height {
        tracing::warn!(
            "Camera resolution {}x{} differs from requested {}x{}",
            actual.width,
            actual.height,
            request.width,
            request.height
        );
    }

    Ok((device, actual))
}

fn decode(data: &[u8], format: &v4l::Format) -> Option<DynamicImage> {
    if format.fourcc == FourCC::new(b"GREY") {
        ImageBuffer::<Luma<u8>, _>::from_raw(format.width, format.height, data.to_vec())
            .map(DynamicImage::ImageLuma8)
    } else if format.fourcc == FourCC::new(b"MJPG") {
        image::load_from_memory(data).ok()
    } else {
        None
    }
}

struct Shared {
    latest: Mutex<Option<Frame>>,
    live: AtomicBool,
}

/// Capture runs on a dedicated thread that owns the device; the stream
/// handle only sees the latest decoded frame.
struct V4lStream {
    shared: Arc<Shared>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl VideoStream for V4lStream {
    fn latest_frame(&self) -> Option<Frame> {
        if !self.is_live() {
            return None;
        }
        self.shared.latest.lock().ok().and_then(|frame| frame.clone())
    }

    fn stop(&self) {
        if !self.shared.live.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.lock().ok().and_then(|mut w| w.take()) {
            if worker.join().is_err() {
                tracing::warn!("Camera capture thread panicked");
            }
        }
        tracing::info!("Camera stream stopped");
    }

    fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    index: u32,
    request: StreamRequest,
    warmup_frames: u32,
    shared: Arc<Shared>,
    ready: oneshot::Sender<Result<(), CameraError>>,
) {
    let (mut device, format) = match configure(index, &request) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut stream = match v4l::io::mmap::Stream::with_buffers(&mut device, Type::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(open_error(index, e)));
            return;
        }
    };

    for i in 0..warmup_frames {
        if let Err(e) = stream.next() {
            let _ = ready.send(Err(CameraError::Unavailable(format!(
                "Failed to capture warmup frame {}: {}",
                i, e
            ))));
            return;
        }
    }
    tracing::info!("Camera {} streaming {}x{}", index, format.width, format.height);
    let _ = ready.send(Ok(()));

    while shared.live.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((buf, _meta)) => {
                if let Some(image) = decode(buf, &format) {
                    if let Ok(mut latest) = shared.latest.lock() {
                        *latest = Some(Arc::new(image));
                    }
                }
            }
            Err(e) => {
                tracing::error!("Camera capture failed: {}", e);
                shared.live.store(false, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl CameraDevice for V4lCamera {
    async fn open(&self, request: &StreamRequest) -> Result<Arc<dyn VideoStream>, CameraError> {
        let shared = Arc::new(Shared { latest: Mutex::new(None), live: AtomicBool::new(true) });
        let (ready_tx, ready_rx) = oneshot::channel();

        let index = self.device_index;
        let warmup = self.warmup_frames;
        let request = *request;
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name(format!("camera-{}", index))
            .spawn(move || capture_loop(index, request, warmup, worker_shared, ready_tx))
            .map_err(|e| CameraError::Unavailable(format!("Failed to start capture thread: {}", e)))?;

        let stream = V4lStream { shared, worker: Mutex::new(Some(worker)) };
        match ready_rx.await {
            Ok(Ok(())) => Ok(Arc::new(stream)),
            Ok(Err(e)) => {
                stream.shared.live.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => Err(CameraError::Unavailable("capture thread exited".to_string())),
        }
    }
}
