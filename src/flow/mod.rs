//! Multi-step flows built on the capture session: enrollment, one-shot
//! verification and the punch authorization itself.

pub mod enrollment;
pub mod punch;
pub mod verification;

pub use enrollment::{Enroller, Enrollment};
pub use punch::{
    AbortReason, Direction, LeaveDecision, PunchInteraction, PunchIntent, PunchOrchestrator, PunchOutcome,
    PunchReceipt, PunchRequest, PunchServices, PunchStage, VerificationLink,
};
pub use verification::{
    VerificationCommand, VerificationEvent, VerificationOutcome, VerificationSession, VerificationState,
};
