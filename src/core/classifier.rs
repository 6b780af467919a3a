use serde::{Deserialize, Serialize};
use std::fmt;
use crate::common::PunchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PunchErrorCategory {
    LocationPermissionDenied,
    LocationUnavailable,
    OutsideGeofence,
    NetworkUnavailable,
    FaceVerificationFailed,
    NetworkNotAuthorized,
    AlreadyPunched,
    Unknown,
}

/// Ordered keyword rules, first match wins. Several keywords overlap
/// ("location" in rules 1 to 3), so the order is the disambiguation.
const RULES: &[(&[&str], PunchErrorCategory)] = &[
    (&["permission denied", "location permission"], PunchErrorCategory::LocationPermissionDenied),
    (&["gps", "enable location", "geolocation"], PunchErrorCategory::LocationUnavailable),
    (&["not within office", "office premises", "location"], PunchErrorCategory::OutsideGeofence),
    (&["network", "internet", "connection", "timeout"], PunchErrorCategory::NetworkUnavailable),
    (&["face", "match", "camera"], PunchErrorCategory::FaceVerificationFailed),
    (&["ip", "authorized"], PunchErrorCategory::NetworkNotAuthorized),
    (&["already punched"], PunchErrorCategory::AlreadyPunched),
];

pub fn classify(message: &str) -> PunchErrorCategory {
    let lower = message.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, category)| *category)
        .unwrap_or(PunchErrorCategory::Unknown)
}

/// Display copy for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remediation {
    pub title: &'static str,
    pub message: &'static str,
    pub tips: &'static [&'static str],
}

impl PunchErrorCategory {
    pub fn remediation(self) -> Remediation {
        match self {
            PunchErrorCategory::LocationPermissionDenied => Remediation {
                title: "Location Permission Required",
                message: "Please allow location access in your browser settings to punch in.",
                tips: &[
                    "Click the lock icon in address bar",
                    "Allow location permission",
                    "Refresh and try again",
                ],
            },
            PunchErrorCategory::LocationUnavailable => Remediation {
                title: "GPS Not Available",
                message: "Please enable GPS/Location on your device.",
                tips: &[
                    "Turn on Location/GPS in device settings",
                    "Make sure you are not in Airplane mode",
                    "Try moving to an open area",
                ],
            },
            PunchErrorCategory::OutsideGeofence => Remediation {
                title: "Not at Office Location",
                message: "You are not within the office premises.",
                tips: &[
                    "Make sure you are inside the office",
                    "Check if GPS is giving accurate location",
                    "Contact admin if you are at office",
                ],
            },
            PunchErrorCategory::NetworkUnavailable => Remediation {
                title: "No Internet Connection",
                message: "Please check your internet connection and try again.",
                tips: &[
                    "Check if WiFi/Mobile data is on",
                    "Try switching between WiFi and Mobile data",
                    "Move to area with better signal",
                ],
            },
            PunchErrorCategory::FaceVerificationFailed => Remediation {
                title: "Face Verification Failed",
                message: "Your face could not be verified. Please try again.",
                tips: &[
                    "Make sure your face is clearly visible",
                    "Check lighting - avoid dark areas",
                    "Remove sunglasses/mask if wearing",
                    "Look directly at the camera",
                ],
            },
            PunchErrorCategory::NetworkNotAuthorized => Remediation {
                title: "Network Not Authorized",
                message: "You are not connected to office network.",
                tips: &["Connect to office WiFi", "Contact IT if you are on office network"],
            },
            PunchErrorCategory::AlreadyPunched => Remediation {
                title: "Already Punched In",
                message: "You have already punched in today.",
                tips: &["Check your attendance status", "You can punch out when leaving"],
            },
            PunchErrorCategory::Unknown => Remediation {
                title: "Punch Failed",
                message: "",
                tips: &["Please try again", "Contact admin if issue persists"],
            },
        }
    }
}

impl fmt::Display for PunchErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remediation().title)
    }
}

/// A failure ready for the remediation UI: its category plus the raw text
/// it was classified from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: PunchErrorCategory,
    pub raw_message: String,
}

impl ClassifiedError {
    pub fn from_message(message: impl Into<String>) -> Self {
        let raw_message = message.into();
        Self { category: classify(&raw_message), raw_message }
    }

    pub fn from_error(error: &PunchError) -> Self {
        Self::from_message(error.user_message())
    }

    pub fn title(&self) -> &'static str {
        self.category.remediation().title
    }

    /// Primary line; an unclassified failure shows its own text.
    pub fn message(&self) -> &str {
        match self.category {
            PunchErrorCategory::Unknown => &self.raw_message,
            other => other.remediation().message,
        }
    }

    pub fn tips(&self) -> &'static [&'static str] {
        self.category.remediation().tips
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}
