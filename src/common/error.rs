use thiserror::Error;

/// Failure to acquire the camera stream.
///
/// Permission denial is kept apart from generic unavailability because the
/// two carry different remediation text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

impl CameraError {
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Camera permission denied. Please allow camera access.".to_string()
            }
            CameraError::Unavailable(_) => "Failed to access camera. Please try again.".to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("location request timed out")]
    Timeout,
}

impl LocationError {
    pub fn user_message(&self) -> String {
        match self {
            LocationError::PermissionDenied => {
                "Location permission denied. Please enable location permission to punch.".to_string()
            }
            LocationError::Unavailable(_) => {
                "Unable to get your location. Please enable GPS and try again.".to_string()
            }
            LocationError::Timeout => {
                "Location request timed out. Please enable location and try again.".to_string()
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum PunchError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Face quality too low: {score}/100 (need {required})")]
    LowQuality { score: u8, required: u8 },

    #[error("Face data not found")]
    FaceDataNotFound,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("A punch attempt is already in progress")]
    AttemptInProgress,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PunchError {
    /// The free-text failure signal shown to the user and fed to
    /// [`crate::core::classifier::classify`].
    pub fn user_message(&self) -> String {
        match self {
            PunchError::Camera(e) => e.user_message(),
            PunchError::Location(e) => e.user_message(),
            PunchError::Model(_) => "Failed to load face recognition. Please try again.".to_string(),
            PunchError::InvalidInput(msg) => msg.clone(),
            PunchError::NoFaceDetected => "No face detected. Please try again.".to_string(),
            PunchError::LowQuality { score, .. } => format!(
                "Face not clear enough ({}% quality). Please adjust your position.",
                score
            ),
            PunchError::FaceDataNotFound => {
                "Face data not found. Please update your profile photo.".to_string()
            }
            PunchError::Rejected(msg) => msg.clone(),
            PunchError::Network(_) => "No internet connection. Please check your network.".to_string(),
            PunchError::Timeout => "Request timeout. Please check your connection.".to_string(),
            PunchError::AttemptInProgress => {
                "A punch is already being processed. Please wait.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_messages_pass_through_verbatim() {
        let err = PunchError::Rejected("Already punched in today".into());
        assert_eq!(err.user_message(), "Already punched in today");
    }

    #[test]
    fn camera_errors_have_distinct_messages() {
        let denied = PunchError::from(CameraError::PermissionDenied).user_message();
        let missing = PunchError::from(CameraError::Unavailable("busy".into())).user_message();
        assert_ne!(denied, missing);
        assert!(denied.contains("permission denied"));
    }
}
