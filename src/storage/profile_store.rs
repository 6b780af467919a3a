use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::backend::ProfileApi;
use crate::common::{DevMode, PunchError, Result};
use crate::core::descriptor::FaceDescriptor;

const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    pub version: u32,
    pub username: String,
    /// Descriptor as the JSON numeric array the server stores.
    pub face_descriptor: Option<String>,
    #[serde(default)]
    pub photo_path: Option<PathBuf>,
    #[serde(default)]
    pub enrolled_at: Option<DateTime<Utc>>,
}

impl StoredProfile {
    pub fn new(username: &str, descriptor: &FaceDescriptor) -> Self {
        Self {
            version: STORAGE_VERSION,
            username: username.to_string(),
            face_descriptor: Some(descriptor.to_json()),
            photo_path: None,
            enrolled_at: Some(Utc::now()),
        }
    }
}

/// Local profile store: one bincode file per user.
pub struct ProfileStore {
    data_dir: PathBuf,
}

impl ProfileStore {
    pub fn new_with_path(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn new_with_dev_mode(dev_mode: &DevMode) -> Result<Self> {
        let data_dir = match dev_mode.data_dir() {
            Some(dir) => dir,
            None => ProjectDirs::from("com", "punchguard", "PunchGuard")
                .ok_or_else(|| PunchError::Storage("Failed to get project dirs".into()))?
                .data_dir()
                .join("users"),
        };

        tracing::debug!("ProfileStore using {}", data_dir.display());
        Self::new_with_path(data_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn user_file(&self, username: &str, extension: &str) -> Result<PathBuf> {
        let valid = !username.is_empty()
            && username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
            && !username.starts_with('.');
        if !valid {
            return Err(PunchError::InvalidInput(format!("Invalid username: {:?}", username)));
        }
        Ok(self.data_dir.join(format!("{}.{}", username, extension)))
    }

    fn profile_path(&self, username: &str) -> Result<PathBuf> {
        self.user_file(username, "bincode")
    }

    /// Save a fresh enrollment with its profile photo. Nothing is written
    /// for an invalid username.
    pub fn save_enrollment(
        &self,
        username: &str,
        descriptor: &FaceDescriptor,
        photo: &DynamicImage,
    ) -> Result<StoredProfile> {
        let photo_path = self.user_file(username, "jpg")?;
        photo.to_rgb8().save(&photo_path)?;

        let mut profile = StoredProfile::new(username, descriptor);
        profile.photo_path = Some(photo_path);
        self.save(&profile)?;
        Ok(profile)
    }

    pub fn save(&self, profile: &StoredProfile) -> Result<()> {
        let path = self.profile_path(&profile.username)?;
        let encoded = bincode::serialize(profile)
            .map_err(|e| PunchError::Storage(format!("Failed to serialize: {}", e)))?;
        fs::write(&path, encoded)?;
        tracing::info!("Saved profile for {} to {}", profile.username, path.display());
        Ok(())
    }

    pub fn load(&self, username: &str) -> Result<StoredProfile> {
        let path = self.profile_path(username)?;
        if !path.exists() {
            return Err(PunchError::UserNotFound(username.to_string()));
        }

        let data = fs::read(path)?;
        let mut profile: StoredProfile = bincode::deserialize(&data)
            .map_err(|e| PunchError::Storage(format!("Failed to deserialize: {}", e)))?;
        if profile.version < STORAGE_VERSION {
            profile.version = STORAGE_VERSION;
        }
        Ok(profile)
    }

    pub fn exists(&self, username: &str) -> bool {
        self.profile_path(username).map(|p| p.exists()).unwrap_or(false)
    }
}

#[async_trait]
impl ProfileApi for ProfileStore {
    async fn enrolled_descriptor(&self, user_id: &str) -> Result<Option<String>> {
        match self.load(user_id) {
            Ok(profile) => Ok(profile.face_descriptor.filter(|d| !d.trim().is_empty())),
            Err(PunchError::UserNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
