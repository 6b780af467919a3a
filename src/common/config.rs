use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::camera::Facing;
use crate::common::error::{PunchError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub punch: PunchConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default)]
    pub facing: Facing,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
}

fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 3 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            facing: Facing::default(),
            warmup_frames: default_warmup_frames(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_live_min_quality")]
    pub live_min_quality: u8,
}

fn default_sample_interval() -> u64 { 500 }
fn default_live_min_quality() -> u8 { crate::core::quality::LIVE_MIN_SCORE }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval(),
            live_min_quality: default_live_min_quality(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerificationConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_countdown")]
    pub countdown_secs: u8,
    #[serde(default = "default_success_hold")]
    pub success_hold_ms: u64,
}

fn default_match_threshold() -> f32 { crate::core::matcher::DEFAULT_MATCH_THRESHOLD }
fn default_countdown() -> u8 { 3 }
fn default_success_hold() -> u64 { 500 }

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            countdown_secs: default_countdown(),
            success_hold_ms: default_success_hold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_enrollment_quality")]
    pub min_quality: u8,
    #[serde(default = "default_crop_size")]
    pub crop_size: u32,
    #[serde(default = "default_crop_margin")]
    pub crop_margin: f32,
    #[serde(default = "default_camera_timeout")]
    pub camera_timeout_secs: u64,
}

fn default_enrollment_quality() -> u8 { crate::core::quality::ENROLLMENT_MIN_SCORE }
fn default_crop_size() -> u32 { 300 }
fn default_crop_margin() -> f32 { 1.6 }
fn default_camera_timeout() -> u64 { 30 }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            min_quality: default_enrollment_quality(),
            crop_size: default_crop_size(),
            crop_margin: default_crop_margin(),
            camera_timeout_secs: default_camera_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PunchConfig {
    #[serde(default = "default_location_timeout")]
    pub location_timeout_secs: u64,
    #[serde(default = "default_commit_timeout")]
    pub commit_timeout_secs: u64,
}

fn default_location_timeout() -> u64 { 10 }
fn default_commit_timeout() -> u64 { 30 }

impl Default for PunchConfig {
    fn default() -> Self {
        Self {
            location_timeout_secs: default_location_timeout(),
            commit_timeout_secs: default_commit_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String { "http://localhost:8000/api".to_string() }
fn default_request_timeout() -> u64 { 30 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Static device coordinates, for terminals that do not move.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LocationConfig {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_detector_path")]
    pub detector_path: PathBuf,
    #[serde(default = "default_recognizer_path")]
    pub recognizer_path: PathBuf,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_detector_path() -> PathBuf { PathBuf::from("models/face_detector.onnx") }
fn default_recognizer_path() -> PathBuf { PathBuf::from("models/face_recognizer.onnx") }
fn default_optimization_level() -> u32 { 3 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: default_detector_path(),
            recognizer_path: default_recognizer_path(),
            optimization_level: default_optimization_level(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_input")]
    pub input_width: u32,
    #[serde(default = "default_detector_input")]
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou_threshold: f32,
}

fn default_detector_input() -> u32 { 640 }
fn default_detection_confidence() -> f32 { 0.5 }
fn default_nms_iou() -> f32 { 0.45 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_detector_input(),
            input_height: default_detector_input(),
            confidence_threshold: default_detection_confidence(),
            nms_iou_threshold: default_nms_iou(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default = "default_recognizer_input")]
    pub input_size: u32,
    #[serde(default = "default_normalization")]
    pub normalization_value: f32,
}

fn default_recognizer_input() -> u32 { 112 }
fn default_normalization() -> f32 { 127.5 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: default_recognizer_input(),
            normalization_value: default_normalization(),
        }
    }
}

pub const TOKEN_ENV_VAR: &str = "PUNCHGUARD_API_TOKEN";

impl Config {
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("configs/punchguard.toml");
        if local.exists() {
            return Self::load_from_path(&local);
        }
        let system = crate::common::paths::system_config_file();
        if system.exists() {
            return Self::load_from_path(&system);
        }
        tracing::info!("No config file found, using defaults");
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PunchError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| PunchError::Config(format!("Config parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                self.api.token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(PunchError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(PunchError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.capture.sample_interval_ms < 50 || self.capture.sample_interval_ms > 5000 {
            return Err(PunchError::Config(format!(
                "Sample interval must be between 50 and 5000 ms, got {}",
                self.capture.sample_interval_ms
            )));
        }
        if self.capture.live_min_quality > 100 || self.enrollment.min_quality > 100 {
            return Err(PunchError::Config(
                "Quality thresholds must be between 0 and 100".to_string()
            ));
        }

        let threshold = self.verification.match_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(PunchError::Config(format!(
                "Match threshold must be a positive number, got {}",
                self.verification.match_threshold
            )));
        }
        if self.verification.countdown_secs > 10 {
            return Err(PunchError::Config(format!(
                "Countdown must be at most 10 seconds, got {}", self.verification.countdown_secs
            )));
        }

        if self.enrollment.crop_size == 0 || self.enrollment.crop_size > 2048 {
            return Err(PunchError::Config(format!(
                "Enrollment crop size must be between 1 and 2048, got {}",
                self.enrollment.crop_size
            )));
        }
        if self.enrollment.crop_margin < 1.0 {
            return Err(PunchError::Config(format!(
                "Enrollment crop margin must be at least 1.0, got {}", self.enrollment.crop_margin
            )));
        }

        if self.punch.location_timeout_secs < 1 || self.punch.location_timeout_secs > 120 {
            return Err(PunchError::Config(format!(
                "Location timeout must be between 1 and 120 seconds, got {}",
                self.punch.location_timeout_secs
            )));
        }
        if self.punch.commit_timeout_secs < 1 || self.punch.commit_timeout_secs > 120 {
            return Err(PunchError::Config(format!(
                "Commit timeout must be between 1 and 120 seconds, got {}",
                self.punch.commit_timeout_secs
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(PunchError::Config("Detector input size must be non-zero".to_string()));
        }
        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(PunchError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }

        Ok(())
    }
}
