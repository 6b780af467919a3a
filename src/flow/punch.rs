use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use crate::backend::{AttendanceApi, LeaveApi, LeaveConflict, ProfileApi, PunchAck, PunchSubmission, TodayStatus};
use crate::biometrics::Biometrics;
use crate::camera::SharedCamera;
use crate::common::{Config, LocationError, PunchError, Result};
use crate::core::classifier::ClassifiedError;
use crate::core::matcher::MatchResult;
use crate::flow::verification::{VerificationCommand, VerificationEvent, VerificationOutcome, VerificationSession};
use crate::location::{Coordinates, LocationProvider};
use crate::storage::CaptureArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// The live state of one punch attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PunchIntent {
    pub direction: Direction,
    pub coordinates: Coordinates,
    pub requires_face_check: bool,
    pub face_verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PunchStage {
    Start,
    AcquiringLocation,
    LeaveCheck,
    LeaveConflictPrompt,
    FaceCheck,
    Committing,
    Done,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveDecision {
    KeepLeave,
    CancelLeaveAndPunch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PunchRequest {
    pub direction: Direction,
    pub disabled: bool,
}

impl PunchRequest {
    pub fn new(direction: Direction) -> Self {
        Self { direction, disabled: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PunchReceipt {
    pub direction: Direction,
    pub coordinates: Coordinates,
    pub face_verified: bool,
    pub match_result: Option<MatchResult>,
    pub ack: PunchAck,
    /// Refreshed after the commit; `None` if the refresh failed.
    pub today: Option<TodayStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LeaveKept,
    VerificationCancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PunchOutcome {
    Committed(PunchReceipt),
    Aborted(AbortReason),
    Failed(ClassifiedError),
    Disabled,
}

/// Channel ends the orchestrator hands to a verification session. The
/// interaction keeps the opposite ends to drive the face check.
pub struct VerificationLink {
    pub commands: mpsc::Receiver<VerificationCommand>,
    pub events: mpsc::UnboundedSender<VerificationEvent>,
}

/// The user-facing side of a punch attempt.
#[async_trait]
pub trait PunchInteraction: Send + Sync {
    /// `last_error` carries the failure of a previous cancel attempt.
    async fn resolve_leave_conflict(&self, conflict: &LeaveConflict, last_error: Option<&str>) -> LeaveDecision;

    async fn open_face_check(&self) -> VerificationLink;

    fn stage_changed(&self, _stage: PunchStage) {}
}

/// External collaborators one orchestrator talks to.
#[derive(Clone)]
pub struct PunchServices {
    pub attendance: Arc<dyn AttendanceApi>,
    pub leaves: Arc<dyn LeaveApi>,
    pub profiles: Arc<dyn ProfileApi>,
    pub location: Arc<dyn LocationProvider>,
    pub camera: SharedCamera,
}

pub struct PunchOrchestrator {
    services: PunchServices,
    biometrics: Biometrics,
    config: Config,
    user_id: String,
    archive: Option<CaptureArchive>,
    in_flight: AtomicBool,
}

struct AttemptGuard<'a>(&'a AtomicBool);

impl<'a> AttemptGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(PunchError::AttemptInProgress);
        }
        Ok(Self(flag))
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PunchOrchestrator {
    pub fn new(services: PunchServices, biometrics: Biometrics, config: Config, user_id: impl Into<String>) -> Self {
        Self {
            services,
            biometrics,
            config,
            user_id: user_id.into(),
            archive: None,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_archive(mut self, archive: CaptureArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one punch attempt to completion.
    ///
    /// Failures inside the attempt come back classified as
    /// [`PunchOutcome::Failed`]; the only `Err` is a concurrent attempt.
    pub async fn punch(&self, request: PunchRequest, ui: &dyn PunchInteraction) -> Result<PunchOutcome> {
        if request.disabled {
            tracing::debug!("Punch {} ignored: trigger disabled", request.direction);
            return Ok(PunchOutcome::Disabled);
        }
        let _guard = AttemptGuard::acquire(&self.in_flight)?;

        tracing::info!("Punch {} started for {}", request.direction, self.user_id);
        ui.stage_changed(PunchStage::Start);

        match self.attempt(request.direction, ui).await {
            Ok(outcome) => {
                match &outcome {
                    PunchOutcome::Committed(_) => ui.stage_changed(PunchStage::Done),
                    PunchOutcome::Aborted(reason) => {
                        tracing::info!("Punch {} aborted: {:?}", request.direction, reason);
                        ui.stage_changed(PunchStage::Aborted);
                    }
                    _ => {}
                }
                Ok(outcome)
            }
            Err(e) => {
                let classified = ClassifiedError::from_error(&e);
                tracing::warn!("Punch {} failed: {} ({:?})", request.direction, e, classified.category);
                ui.stage_changed(PunchStage::Failed);
                Ok(PunchOutcome::Failed(classified))
            }
        }
    }

    async fn attempt(&self, direction: Direction, ui: &dyn PunchInteraction) -> Result<PunchOutcome> {
        ui.stage_changed(PunchStage::AcquiringLocation);
        let coordinates = self.acquire_location().await?;
        let mut intent = PunchIntent {
            direction,
            coordinates,
            requires_face_check: false,
            face_verified: false,
        };

        let mut match_result = None;
        if direction == Direction::In {
            ui.stage_changed(PunchStage::LeaveCheck);
            if let Some(conflict) = self.services.leaves.today_leave_conflict(&self.user_id).await? {
                if self.negotiate_leave(&conflict, ui).await? == LeaveDecision::KeepLeave {
                    return Ok(PunchOutcome::Aborted(AbortReason::LeaveKept));
                }
            }

            let enrolled = self
                .services
                .profiles
                .enrolled_descriptor(&self.user_id)
                .await?
                .filter(|d| !d.trim().is_empty());

            if let Some(enrolled) = enrolled {
                intent.requires_face_check = true;
                ui.stage_changed(PunchStage::FaceCheck);
                match self.verify(enrolled, ui).await? {
                    VerificationOutcome::Verified(result) => {
                        intent.face_verified = true;
                        match_result = Some(result);
                    }
                    VerificationOutcome::Cancelled => {
                        return Ok(PunchOutcome::Aborted(AbortReason::VerificationCancelled));
                    }
                }
            } else {
                tracing::info!("No enrolled face for {}, skipping face check", self.user_id);
            }
        }

        ui.stage_changed(PunchStage::Committing);
        let ack = self.commit(&intent).await?;
        tracing::info!("Punch {} committed: {}", direction, ack.message);

        let today = match self.services.attendance.today_status().await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!("Failed to refresh today's attendance: {}", e);
                None
            }
        };

        Ok(PunchOutcome::Committed(PunchReceipt {
            direction,
            coordinates: intent.coordinates,
            face_verified: intent.face_verified,
            match_result,
            ack,
            today,
        }))
    }

    async fn acquire_location(&self) -> Result<Coordinates> {
        let limit = Duration::from_secs(self.config.punch.location_timeout_secs);
        let coordinates = match timeout(limit, self.services.location.current()).await {
            Ok(result) => result?,
            Err(_) => return Err(LocationError::Timeout.into()),
        };
        coordinates.validate()?;
        tracing::debug!("Location acquired: {:.5}, {:.5}", coordinates.latitude, coordinates.longitude);
        Ok(coordinates)
    }

    /// Prompt until the user keeps the leave or the cancellation succeeds.
    async fn negotiate_leave(&self, conflict: &LeaveConflict, ui: &dyn PunchInteraction) -> Result<LeaveDecision> {
        let mut last_error: Option<String> = None;
        loop {
            ui.stage_changed(PunchStage::LeaveConflictPrompt);
            match ui.resolve_leave_conflict(conflict, last_error.as_deref()).await {
                LeaveDecision::KeepLeave => return Ok(LeaveDecision::KeepLeave),
                LeaveDecision::CancelLeaveAndPunch => {
                    let today: NaiveDate = Local::now().date_naive();
                    match self.services.leaves.cancel_leave(conflict.leave_id, today).await {
                        Ok(()) => {
                            tracing::info!("Leave {} cancelled for {}", conflict.leave_id, today);
                            return Ok(LeaveDecision::CancelLeaveAndPunch);
                        }
                        Err(e) => {
                            tracing::warn!("Leave cancellation failed: {}", e);
                            last_error = Some(e.user_message());
                        }
                    }
                }
            }
        }
    }

    async fn verify(&self, enrolled: String, ui: &dyn PunchInteraction) -> Result<VerificationOutcome> {
        let VerificationLink { mut commands, events } = ui.open_face_check().await;
        let mut session = VerificationSession::new(
            self.services.camera.clone(),
            self.biometrics.clone(),
            self.config.clone(),
            enrolled,
            events,
        );
        if let Some(archive) = &self.archive {
            session = session.with_archive(archive.clone());
        }
        session.run(&mut commands).await
    }

    async fn commit(&self, intent: &PunchIntent) -> Result<PunchAck> {
        let submission = PunchSubmission::new(intent.direction, intent.coordinates, intent.face_verified);
        let limit = Duration::from_secs(self.config.punch.commit_timeout_secs);
        match timeout(limit, self.services.attendance.punch(&submission)).await {
            Ok(result) => result,
            Err(_) => Err(PunchError::Timeout),
        }
    }
}
