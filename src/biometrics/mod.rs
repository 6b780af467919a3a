pub mod yolo;
#[cfg(feature = "onnx")]
pub mod onnx;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use crate::camera::Frame;
use crate::common::Result;
use crate::core::detection::{Detection, FaceAnalysis};

/// Face detection and embedding, treated as a black box.
///
/// Implementations must be cheap to share: one instance serves every
/// capture session in the process.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Detector only. Used by the sampling loop.
    async fn detect_face(&self, frame: Frame) -> Result<Option<Detection>>;

    /// Detector plus embedding for a captured still.
    async fn detect_single_face(&self, frame: Frame) -> Result<Option<FaceAnalysis>>;
}

pub type SharedEmbedder = Arc<dyn EmbeddingService>;

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<SharedEmbedder>;
}

/// Loader for an already constructed service.
pub struct Preloaded(pub SharedEmbedder);

#[async_trait]
impl ModelLoader for Preloaded {
    async fn load(&self) -> Result<SharedEmbedder> {
        Ok(self.0.clone())
    }
}

/// Stand-in for builds without an inference backend.
pub struct NoModels;

#[async_trait]
impl ModelLoader for NoModels {
    async fn load(&self) -> Result<SharedEmbedder> {
        Err(crate::common::PunchError::Model(
            "face recognition is not available: built without the `onnx` feature".to_string(),
        ))
    }
}

#[derive(Default)]
struct Slot {
    pinned: Option<SharedEmbedder>,
    live: Option<Weak<dyn EmbeddingService>>,
}

impl Slot {
    fn upgrade(&self) -> Option<SharedEmbedder> {
        self.pinned
            .clone()
            .or_else(|| self.live.as_ref().and_then(Weak::upgrade))
    }
}

/// Process-wide handle to the loaded embedding models.
///
/// The registry pins the loaded service between `init`/`acquire` and
/// `shutdown`. Handles given out keep the service alive on their own, so a
/// session still holding one after `shutdown` is unaffected.
#[derive(Default)]
pub struct ModelRegistry {
    slot: Mutex<Slot>,
    loads: AtomicUsize,
}

static GLOBAL: Lazy<Arc<ModelRegistry>> = Lazy::new(|| Arc::new(ModelRegistry::new()));

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<ModelRegistry> {
        GLOBAL.clone()
    }

    /// Return the live service, loading it if nothing holds one.
    ///
    /// Concurrent callers wait on the same load.
    pub async fn acquire(&self, loader: &dyn ModelLoader) -> Result<SharedEmbedder> {
        let mut slot = self.slot.lock().await;
        if let Some(service) = slot.upgrade() {
            slot.pinned = Some(service.clone());
            return Ok(service);
        }

        tracing::info!("Loading face recognition models");
        let service = loader.load().await?;
        let count = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Face recognition models loaded (load #{})", count);

        slot.live = Some(Arc::downgrade(&service));
        slot.pinned = Some(service.clone());
        Ok(service)
    }

    /// Eager load at startup.
    pub async fn init(&self, loader: &dyn ModelLoader) -> Result<()> {
        self.acquire(loader).await.map(|_| ())
    }

    /// Drop the registry's own claim on the models.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if slot.pinned.take().is_some() {
            tracing::info!("Face recognition models released");
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.upgrade().is_some()
    }

    /// How many times a loader actually ran.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

/// What a session needs to get at the embedding models.
#[derive(Clone)]
pub struct Biometrics {
    registry: Arc<ModelRegistry>,
    loader: Arc<dyn ModelLoader>,
}

impl Biometrics {
    pub fn new(registry: Arc<ModelRegistry>, loader: Arc<dyn ModelLoader>) -> Self {
        Self { registry, loader }
    }

    /// Registry-less wrapper around a ready service.
    pub fn preloaded(service: SharedEmbedder) -> Self {
        Self::new(Arc::new(ModelRegistry::new()), Arc::new(Preloaded(service)))
    }

    pub async fn acquire(&self) -> Result<SharedEmbedder> {
        self.registry.acquire(self.loader.as_ref()).await
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }
}

impl fmt::Debug for Biometrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Biometrics")
            .field("loads", &self.registry.load_count())
            .finish()
    }
}
