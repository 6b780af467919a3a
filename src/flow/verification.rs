use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use crate::biometrics::{Biometrics, SharedEmbedder};
use crate::camera::{CaptureSession, SharedCamera};
use crate::common::{CameraError, Config, PunchError, Result};
use crate::core::descriptor::FaceDescriptor;
use crate::core::matcher::{match_descriptors, MatchResult};
use crate::core::quality::QualityReport;
use crate::storage::CaptureArchive;

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerificationState {
    Idle,
    Initializing,
    Ready,
    CountingDown(u8),
    Capturing,
    Verifying,
    Success,
    Retry,
    Cancelled,
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationState::CountingDown(n) => write!(f, "CountingDown({})", n),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Input from whoever drives the verification UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationCommand {
    StartCountdown,
    StopCountdown,
    CaptureNow,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationEvent {
    State(VerificationState),
    Quality(QualityReport),
    Message(String),
    Matched(MatchResult),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerificationOutcome {
    Verified(MatchResult),
    Cancelled,
}

/// One capture-then-match attempt against an enrolled descriptor.
///
/// The capture session opened in `Initializing` is closed before `run`
/// returns on every path; on success it is closed before `Success` is
/// announced.
pub struct VerificationSession {
    camera: SharedCamera,
    biometrics: Biometrics,
    config: Config,
    enrolled: String,
    events: mpsc::UnboundedSender<VerificationEvent>,
    archive: Option<CaptureArchive>,
    state: VerificationState,
}

impl VerificationSession {
    pub fn new(
        camera: SharedCamera,
        biometrics: Biometrics,
        config: Config,
        enrolled: String,
        events: mpsc::UnboundedSender<VerificationEvent>,
    ) -> Self {
        Self {
            camera,
            biometrics,
            config,
            enrolled,
            events,
            archive: None,
            state: VerificationState::Idle,
        }
    }

    pub fn with_archive(mut self, archive: CaptureArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub async fn run(mut self, commands: &mut mpsc::Receiver<VerificationCommand>) -> Result<VerificationOutcome> {
        self.transition(VerificationState::Initializing);

        let opened = async {
            let embedder = self.biometrics.acquire().await.map_err(|e| {
                tracing::error!("Face models unavailable: {}", e);
                CameraError::Unavailable(format!("face models unavailable: {}", e))
            })?;
            let session = CaptureSession::open(self.camera.as_ref(), embedder.clone(), &self.config).await?;
            Ok::<_, PunchError>((embedder, session))
        };
        let (embedder, session) = tokio::select! {
            opened = opened => opened?,
            _ = wait_for_cancel(commands) => {
                self.transition(VerificationState::Cancelled);
                return Ok(VerificationOutcome::Cancelled);
            }
        };

        let outcome = self.drive(&session, &embedder, commands).await;
        session.close();

        match &outcome {
            Ok(VerificationOutcome::Verified(_)) => {
                sleep(Duration::from_millis(self.config.verification.success_hold_ms)).await;
            }
            Ok(VerificationOutcome::Cancelled) => self.transition(VerificationState::Cancelled),
            Err(e) => tracing::warn!("Verification failed: {}", e),
        }
        outcome
    }

    async fn drive(
        &mut self,
        session: &CaptureSession,
        embedder: &SharedEmbedder,
        commands: &mut mpsc::Receiver<VerificationCommand>,
    ) -> Result<VerificationOutcome> {
        let mut reports = session.subscribe();
        let mut countdown: Option<(u8, Instant)> = None;
        self.transition(VerificationState::Ready);

        loop {
            let deadline = countdown.map(|(_, at)| at).unwrap_or_else(Instant::now);

            let capture = tokio::select! {
                command = commands.recv() => match command {
                    None | Some(VerificationCommand::Cancel) => return Ok(VerificationOutcome::Cancelled),
                    Some(VerificationCommand::StartCountdown) => {
                        if countdown.is_none() {
                            let secs = self.config.verification.countdown_secs;
                            if secs == 0 {
                                true
                            } else {
                                countdown = Some((secs, Instant::now() + COUNTDOWN_STEP));
                                self.transition(VerificationState::CountingDown(secs));
                                false
                            }
                        } else {
                            false
                        }
                    }
                    Some(VerificationCommand::StopCountdown) => {
                        if countdown.take().is_some() {
                            self.transition(VerificationState::Ready);
                        }
                        false
                    }
                    Some(VerificationCommand::CaptureNow) => {
                        if session.is_ready() {
                            countdown = None;
                            true
                        } else {
                            let report = session.latest_report();
                            self.message(format!(
                                "Face quality too low ({}%). Need {}% to capture.",
                                report.overall_score,
                                session.live_min_quality()
                            ));
                            false
                        }
                    }
                },
                changed = reports.changed() => {
                    if changed.is_err() {
                        return Err(PunchError::from(CameraError::Unavailable(
                            "camera stream ended".to_string(),
                        )));
                    }
                    let report = reports.borrow_and_update().clone();
                    self.emit(VerificationEvent::Quality(report));
                    false
                },
                _ = sleep_until(deadline), if countdown.is_some() => {
                    match countdown {
                        Some((remaining, at)) if remaining > 1 => {
                            countdown = Some((remaining - 1, at + COUNTDOWN_STEP));
                            self.transition(VerificationState::CountingDown(remaining - 1));
                            false
                        }
                        _ => {
                            countdown = None;
                            true
                        }
                    }
                },
            };

            if !capture {
                continue;
            }

            let attempt = tokio::select! {
                attempt = self.attempt(session, embedder) => attempt?,
                _ = wait_for_cancel(commands) => return Ok(VerificationOutcome::Cancelled),
            };
            if let Some(result) = attempt {
                return Ok(VerificationOutcome::Verified(result));
            }
        }
    }

    /// Capture, embed and match once. `None` means back to `Ready`.
    async fn attempt(&mut self, session: &CaptureSession, embedder: &SharedEmbedder) -> Result<Option<MatchResult>> {
        self.transition(VerificationState::Capturing);
        let captured = async {
            let still = session.capture_still()?;
            let analysis = embedder.detect_single_face(still.clone()).await?;
            Ok::<_, PunchError>((still, analysis))
        }
        .await;

        let (still, analysis) = match captured {
            Ok(captured) => captured,
            // A closed session cannot be retried.
            Err(e) if session.is_open() => {
                tracing::warn!("Capture attempt failed: {}", e);
                self.message("Verification failed. Please try again.".to_string());
                self.transition(VerificationState::Ready);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if let Some(archive) = &self.archive {
            archive.record("verify", &still, analysis.as_ref().map(|a| &a.detection));
        }

        let Some(analysis) = analysis else {
            self.message("No face detected. Please try again.".to_string());
            self.transition(VerificationState::Ready);
            return Ok(None);
        };

        self.transition(VerificationState::Verifying);
        let enrolled = FaceDescriptor::from_json(&self.enrolled).map_err(|e| {
            tracing::error!("Enrolled descriptor unusable: {}", e);
            PunchError::FaceDataNotFound
        })?;
        let result = match_descriptors(&analysis.descriptor, &enrolled, self.config.verification.match_threshold)?;
        self.emit(VerificationEvent::Matched(result));

        if result.matched {
            session.close();
            self.message(format!("Face verified! ({}% match)", result.confidence_rounded()));
            self.transition(VerificationState::Success);
            Ok(Some(result))
        } else {
            self.message(format!(
                "Face not matched ({}% similarity). Try again.",
                result.confidence_rounded()
            ));
            self.transition(VerificationState::Retry);
            self.transition(VerificationState::Ready);
            Ok(None)
        }
    }

    fn transition(&mut self, next: VerificationState) {
        tracing::debug!("Verification {} -> {}", self.state, next);
        self.state = next;
        self.emit(VerificationEvent::State(next));
    }

    fn message(&self, text: String) {
        tracing::info!("{}", text);
        self.emit(VerificationEvent::Message(text));
    }

    fn emit(&self, event: VerificationEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// Resolves on `Cancel` or a closed command channel; anything else is
/// dropped while the session is busy.
async fn wait_for_cancel(commands: &mut mpsc::Receiver<VerificationCommand>) {
    loop {
        match commands.recv().await {
            None | Some(VerificationCommand::Cancel) => return,
            Some(other) => tracing::debug!("Ignoring {:?} while busy", other),
        }
    }
}
