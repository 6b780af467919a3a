use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use crate::biometrics::{yolo, EmbeddingService, ModelLoader, SharedEmbedder};
use crate::camera::Frame;
use crate::common::config::{DetectorConfig, RecognizerConfig};
use crate::common::{Config, PunchError, Result};
use crate::core::descriptor::{FaceDescriptor, DESCRIPTOR_LEN};
use crate::core::detection::{best_detection, non_max_suppression, Detection, FaceAnalysis};

fn model_error(context: &str, e: impl std::fmt::Display) -> PunchError {
    PunchError::Model(format!("{}: {}", context, e))
}

fn resolve(path: &Path, models_base: &Path) -> PathBuf {
    if path.is_relative() {
        models_base.join(path)
    } else {
        path.to_path_buf()
    }
}

fn build_session(environment: &Arc<Environment>, path: &Path, optimization_level: u32) -> Result<Session> {
    if !path.exists() {
        return Err(PunchError::Model(format!("Model not found at: {:?}", path)));
    }

    let level = match optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };

    SessionBuilder::new(environment)
        .and_then(|builder| builder.with_optimization_level(level))
        .and_then(|builder| builder.with_model_from_file(path))
        .map_err(|e| model_error("Failed to load model", e))
}

struct Models {
    detector: Session,
    recognizer: Session,
    detector_config: DetectorConfig,
    recognizer_config: RecognizerConfig,
    _environment: Arc<Environment>,
}

/// YOLO face detector plus a 128-d embedding network.
pub struct OnnxEmbeddingService {
    models: Arc<Models>,
}

impl OnnxEmbeddingService {
    pub fn load(config: &Config, models_base: &Path) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("punchguard")
                .build()
                .map_err(|e| model_error("Failed to create environment", e))?,
        );

        let detector = build_session(
            &environment,
            &resolve(&config.models.detector_path, models_base),
            config.models.optimization_level,
        )?;
        let recognizer = build_session(
            &environment,
            &resolve(&config.models.recognizer_path, models_base),
            config.models.optimization_level,
        )?;

        Ok(Self {
            models: Arc::new(Models {
                detector,
                recognizer,
                detector_config: config.detector.clone(),
                recognizer_config: config.recognizer.clone(),
                _environment: environment,
            }),
        })
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Models) -> Result<T> + Send + 'static,
    {
        let models = self.models.clone();
        tokio::task::spawn_blocking(move || job(&models))
            .await
            .map_err(|e| model_error("Inference task failed", e))?
    }
}

impl Models {
    fn detect(&self, image: &DynamicImage) -> Result<Option<Detection>> {
        let cfg = &self.detector_config;
        let resized = if image.width() == cfg.input_width && image.height() == cfg.input_height {
            image.clone()
        } else {
            image.resize_exact(cfg.input_width, cfg.input_height, FilterType::Nearest)
        };

        let input = CowArray::from(detector_input(&resized).into_dyn());
        let tensor = Value::from_array(self.detector.allocator(), &input)
            .map_err(|e| model_error("Detector input", e))?;
        let outputs = self
            .detector
            .run(vec![tensor])
            .map_err(|e| model_error("Detector inference", e))?;
        let output = outputs
            .first()
            .ok_or_else(|| PunchError::Model("Detector returned no outputs".to_string()))?
            .try_extract::<f32>()
            .map_err(|e| model_error("Detector output", e))?;
        let view = output.view();
        let data: Vec<f32> = view.iter().copied().collect();

        let mut detections = yolo::decode(&data, view.shape(), cfg.input_width, cfg.input_height);
        detections = non_max_suppression(detections, cfg.nms_iou_threshold);
        yolo::rescale(&mut detections, cfg.input_width, cfg.input_height, image.width(), image.height());

        Ok(best_detection(detections, cfg.confidence_threshold))
    }

    fn embed(&self, image: &DynamicImage, detection: &Detection) -> Result<FaceDescriptor> {
        let bbox = detection.bbox.clamp_to(image.width(), image.height());
        let face = image.crop_imm(
            bbox.x as u32,
            bbox.y as u32,
            bbox.width.max(1.0) as u32,
            bbox.height.max(1.0) as u32,
        );

        let size = self.recognizer_config.input_size;
        let resized = face.resize_exact(size, size, FilterType::Triangle);

        let input = CowArray::from(
            recognizer_input(&resized, self.recognizer_config.normalization_value).into_dyn(),
        );
        let tensor = Value::from_array(self.recognizer.allocator(), &input)
            .map_err(|e| model_error("Recognizer input", e))?;
        let outputs = self
            .recognizer
            .run(vec![tensor])
            .map_err(|e| model_error("Recognizer inference", e))?;
        let output = outputs
            .first()
            .ok_or_else(|| PunchError::Model("Recognizer returned no outputs".to_string()))?
            .try_extract::<f32>()
            .map_err(|e| model_error("Recognizer output", e))?;
        let values: Vec<f32> = output.view().iter().copied().collect();

        if values.len() != DESCRIPTOR_LEN {
            return Err(PunchError::Model(format!(
                "Recognizer produced {} values, expected {}",
                values.len(),
                DESCRIPTOR_LEN
            )));
        }
        FaceDescriptor::new(values).map_err(|e| model_error("Recognizer output", e))
    }
}

/// RGB, 0..1, NCHW.
fn detector_input(image: &DynamicImage) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let mut array = Array4::<f32>::zeros((1, 3, height, width));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            array[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    array
}

/// RGB centred on `norm`, NCHW.
fn recognizer_input(image: &DynamicImage, norm: f32) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let mut array = Array4::<f32>::zeros((1, 3, height, width));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            array[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - norm) / norm;
        }
    }
    array
}

#[async_trait]
impl EmbeddingService for OnnxEmbeddingService {
    async fn detect_face(&self, frame: Frame) -> Result<Option<Detection>> {
        self.blocking(move |models| models.detect(&frame)).await
    }

    async fn detect_single_face(&self, frame: Frame) -> Result<Option<FaceAnalysis>> {
        self.blocking(move |models| {
            let Some(detection) = models.detect(&frame)? else {
                return Ok(None);
            };
            let descriptor = models.embed(&frame, &detection)?;
            Ok(Some(FaceAnalysis { detection, descriptor }))
        })
        .await
    }
}

/// Loads the ONNX models on a blocking thread the first time they are needed.
pub struct OnnxModelLoader {
    config: Config,
    models_base: PathBuf,
}

impl OnnxModelLoader {
    pub fn new(config: Config, models_base: PathBuf) -> Self {
        Self { config, models_base }
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> Result<SharedEmbedder> {
        let config = self.config.clone();
        let base = self.models_base.clone();
        let service = tokio::task::spawn_blocking(move || OnnxEmbeddingService::load(&config, &base))
            .await
            .map_err(|e| model_error("Model loading task failed", e))??;
        Ok(Arc::new(service))
    }
}
