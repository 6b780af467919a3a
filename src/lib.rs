// Core modules
pub mod backend;
pub mod biometrics;
pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod flow;
pub mod location;
pub mod storage;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use common::{CameraError, Config, DevMode, LocationError, PunchError, Result};
pub use core::{classify, ClassifiedError, FaceDescriptor, MatchResult, PunchErrorCategory, QualityReport};
pub use flow::{Direction, PunchOrchestrator, PunchOutcome, PunchRequest};
