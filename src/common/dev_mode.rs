use std::path::{Path, PathBuf};
use std::fs;
use crate::common::error::Result;

/// Development mode: keeps profiles, captured stills and debug images in a
/// local directory instead of the system locations.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(base_dir.join("users"))?;
            fs::create_dir_all(base_dir.join("captures"))?;
            fs::create_dir_all(base_dir.join("debug"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}", base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn disabled() -> Self {
        Self { enabled: false, base_dir: PathBuf::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.enabled.then_some(self.base_dir.as_path())
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        self.base_dir().map(|base| base.join("users"))
    }

    pub fn captures_dir(&self) -> Option<PathBuf> {
        self.base_dir().map(|base| base.join("captures"))
    }

    pub fn debug_dir(&self) -> Option<PathBuf> {
        self.base_dir().map(|base| base.join("debug"))
    }

    pub fn get_capture_path(&self, prefix: &str) -> Option<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S%3f");
        self.captures_dir().map(|dir| dir.join(format!("{}_{}.jpg", prefix, timestamp)))
    }

    pub fn get_debug_path(&self, prefix: &str) -> Option<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S%3f");
        self.debug_dir().map(|dir| dir.join(format!("{}_{}.jpg", prefix, timestamp)))
    }
}
