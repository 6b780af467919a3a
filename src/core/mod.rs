pub mod classifier;
pub mod descriptor;
pub mod detection;
pub mod matcher;
pub mod quality;

pub use classifier::{classify, ClassifiedError, PunchErrorCategory, Remediation};
pub use descriptor::{FaceDescriptor, DESCRIPTOR_LEN};
pub use detection::{best_detection, non_max_suppression, Detection, DetectionBox, FaceAnalysis};
pub use matcher::{match_descriptors, MatchResult, DEFAULT_MATCH_THRESHOLD};
pub use quality::{score, QualityCheck, QualityReport};
