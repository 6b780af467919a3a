//! In-memory collaborators for driving whole punch attempts.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use image::DynamicImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use punchguard::backend::{AttendanceApi, LeaveApi, LeaveConflict, ProfileApi, PunchAck, PunchSubmission, TodayStatus};
use punchguard::biometrics::{Biometrics, EmbeddingService};
use punchguard::camera::{Frame, StillImageCamera};
use punchguard::common::{Config, LocationError, PunchError, Result};
use punchguard::core::descriptor::{FaceDescriptor, DESCRIPTOR_LEN};
use punchguard::core::detection::{Detection, DetectionBox, FaceAnalysis};
use punchguard::flow::{
    LeaveDecision, PunchInteraction, PunchOrchestrator, PunchServices, PunchStage, VerificationCommand,
    VerificationEvent, VerificationLink,
};
use punchguard::location::{Coordinates, LocationProvider};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub fn descriptor(offset: f32) -> FaceDescriptor {
    let mut values = vec![0.0f32; DESCRIPTOR_LEN];
    values[0] = offset;
    FaceDescriptor::new(values).unwrap()
}

pub fn office() -> Coordinates {
    Coordinates { latitude: 12.9716, longitude: 77.5946 }
}

/// Always sees the same well-framed face.
pub struct SteadyFace {
    pub descriptor: FaceDescriptor,
}

#[async_trait]
impl EmbeddingService for SteadyFace {
    async fn detect_face(&self, _frame: Frame) -> Result<Option<Detection>> {
        let side = HEIGHT as f32 * 0.6;
        Ok(Some(Detection::new(
            DetectionBox::from_center(WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0, side, side),
            0.92,
        )))
    }

    async fn detect_single_face(&self, frame: Frame) -> Result<Option<FaceAnalysis>> {
        let detection = self.detect_face(frame).await?;
        Ok(detection.map(|detection| FaceAnalysis { detection, descriptor: self.descriptor.clone() }))
    }
}

#[derive(Default)]
pub struct FakeAttendance {
    pub submissions: Mutex<Vec<PunchSubmission>>,
    pub reject_with: Mutex<Option<String>>,
    pub status_fails: Mutex<bool>,
    /// Server think time before a punch is accepted.
    pub delay: Duration,
}

impl FakeAttendance {
    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }
}

#[async_trait]
impl AttendanceApi for FakeAttendance {
    async fn punch(&self, submission: &PunchSubmission) -> Result<PunchAck> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = self.reject_with.lock().unwrap().clone() {
            return Err(PunchError::Rejected(message));
        }
        self.submissions.lock().unwrap().push(*submission);
        Ok(PunchAck {
            message: format!("Punched {} successfully", submission.direction),
            record: None,
        })
    }

    async fn today_status(&self) -> Result<TodayStatus> {
        if *self.status_fails.lock().unwrap() {
            return Err(PunchError::Network("connection reset".to_string()));
        }
        let punched = self.submissions.lock().unwrap().clone();
        Ok(TodayStatus {
            punch_in: punched.iter().any(|s| s.direction.to_string() == "in").then(|| "09:00".to_string()),
            ..TodayStatus::default()
        })
    }
}

#[derive(Default)]
pub struct FakeLeaves {
    pub conflict: Option<LeaveConflict>,
    /// Results for successive cancel calls; empty means success.
    pub cancel_results: Mutex<VecDeque<Result<()>>>,
    pub cancelled: Mutex<Vec<(u64, NaiveDate)>>,
    pub checks: AtomicUsize,
}

impl FakeLeaves {
    pub fn with_conflict() -> Self {
        Self {
            conflict: Some(LeaveConflict {
                leave_id: 7,
                leave_type: "Casual Leave".to_string(),
                start_date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
                message: "You have approved leave today".to_string(),
            }),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LeaveApi for FakeLeaves {
    async fn today_leave_conflict(&self, _user_id: &str) -> Result<Option<LeaveConflict>> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.conflict.clone())
    }

    async fn cancel_leave(&self, leave_id: u64, date: NaiveDate) -> Result<()> {
        let result = self.cancel_results.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.cancelled.lock().unwrap().push((leave_id, date));
        }
        result
    }
}

pub struct FakeProfiles(pub Option<String>);

#[async_trait]
impl ProfileApi for FakeProfiles {
    async fn enrolled_descriptor(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Location source with a scripted answer and optional delay.
pub struct ScriptedLocation {
    pub answer: std::result::Result<Coordinates, LocationError>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedLocation {
    pub fn at(coordinates: Coordinates) -> Self {
        Self { answer: Ok(coordinates), delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn failing(error: LocationError) -> Self {
        Self { answer: Err(error), delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn slow(coordinates: Coordinates, delay: Duration) -> Self {
        Self { delay, ..Self::at(coordinates) }
    }
}

#[async_trait]
impl LocationProvider for ScriptedLocation {
    async fn current(&self) -> std::result::Result<Coordinates, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone()
    }
}

/// Plays back leave decisions and verification keystrokes.
#[derive(Default)]
pub struct ScriptedUser {
    pub leave_decisions: Mutex<VecDeque<LeaveDecision>>,
    pub leave_errors_seen: Mutex<Vec<Option<String>>>,
    /// Sent one by one, each after the given pause.
    pub verification_script: Vec<(Duration, VerificationCommand)>,
    pub stages: Mutex<Vec<PunchStage>>,
    pub events: Arc<Mutex<Vec<VerificationEvent>>>,
    pub face_checks: AtomicUsize,
}

impl ScriptedUser {
    pub fn capturing() -> Self {
        Self {
            verification_script: vec![(Duration::from_millis(700), VerificationCommand::CaptureNow)],
            ..Self::default()
        }
    }

    pub fn cancelling() -> Self {
        Self {
            verification_script: vec![(Duration::from_millis(700), VerificationCommand::Cancel)],
            ..Self::default()
        }
    }

    pub fn deciding(decisions: &[LeaveDecision]) -> Self {
        Self {
            leave_decisions: Mutex::new(decisions.iter().copied().collect()),
            ..Self::capturing()
        }
    }

    pub fn stages(&self) -> Vec<PunchStage> {
        self.stages.lock().unwrap().clone()
    }
}

#[async_trait]
impl PunchInteraction for ScriptedUser {
    async fn resolve_leave_conflict(&self, _conflict: &LeaveConflict, last_error: Option<&str>) -> LeaveDecision {
        self.leave_errors_seen.lock().unwrap().push(last_error.map(str::to_string));
        self.leave_decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LeaveDecision::KeepLeave)
    }

    async fn open_face_check(&self) -> VerificationLink {
        self.face_checks.fetch_add(1, Ordering::SeqCst);
        let (command_tx, commands) = mpsc::channel(8);
        let (events, mut event_rx) = mpsc::unbounded_channel();

        let script = self.verification_script.clone();
        tokio::spawn(async move {
            for (pause, command) in script {
                tokio::time::sleep(pause).await;
                if command_tx.send(command).await.is_err() {
                    return;
                }
            }
            // Hold the sender so the session is not cancelled by a closed channel.
            command_tx.closed().await;
        });

        let sink = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                sink.lock().unwrap().push(event);
            }
        });

        VerificationLink { commands, events }
    }

    fn stage_changed(&self, stage: PunchStage) {
        self.stages.lock().unwrap().push(stage);
    }
}

pub struct Rig {
    pub attendance: Arc<FakeAttendance>,
    pub leaves: Arc<FakeLeaves>,
    pub location: Arc<ScriptedLocation>,
    pub camera: Arc<StillImageCamera>,
    pub orchestrator: PunchOrchestrator,
}

pub struct RigBuilder {
    pub attendance: FakeAttendance,
    pub leaves: FakeLeaves,
    pub enrolled: Option<String>,
    pub location: ScriptedLocation,
    pub camera: StillImageCamera,
    pub live: FaceDescriptor,
}

impl Default for RigBuilder {
    fn default() -> Self {
        Self {
            attendance: FakeAttendance::default(),
            leaves: FakeLeaves::default(),
            enrolled: None,
            location: ScriptedLocation::at(office()),
            camera: StillImageCamera::from_images(vec![DynamicImage::new_rgb8(WIDTH, HEIGHT)]),
            live: descriptor(0.0),
        }
    }
}

impl RigBuilder {
    pub fn build(self) -> Rig {
        let attendance = Arc::new(self.attendance);
        let leaves = Arc::new(self.leaves);
        let location = Arc::new(self.location);
        let camera = Arc::new(self.camera);

        let services = PunchServices {
            attendance: attendance.clone(),
            leaves: leaves.clone(),
            profiles: Arc::new(FakeProfiles(self.enrolled)),
            location: location.clone(),
            camera: camera.clone(),
        };
        let biometrics = Biometrics::preloaded(Arc::new(SteadyFace { descriptor: self.live }));
        let orchestrator = PunchOrchestrator::new(services, biometrics, Config::default(), "alice");

        Rig { attendance, leaves, location, camera, orchestrator }
    }
}
