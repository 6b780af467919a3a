//! Terminal front end for the punch flow.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use crate::backend::LeaveConflict;
use crate::core::classifier::ClassifiedError;
use crate::core::quality::QualityReport;
use crate::flow::{
    LeaveDecision, PunchInteraction, PunchOutcome, PunchStage, VerificationCommand, VerificationEvent,
    VerificationLink, VerificationState,
};

/// Lines typed on stdin, read by one background task.
#[derive(Clone)]
pub struct StdinLines {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl StdinLines {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { lines: Arc::new(Mutex::new(rx)) }
    }

    /// Next trimmed, lower-cased line; `None` once stdin is closed.
    pub async fn next(&self) -> Option<String> {
        self.lines.lock().await.recv().await.map(|l| l.trim().to_lowercase())
    }
}

pub struct TerminalInteraction {
    input: StdinLines,
}

impl TerminalInteraction {
    pub fn new(input: StdinLines) -> Self {
        Self { input }
    }
}

#[async_trait]
impl PunchInteraction for TerminalInteraction {
    async fn resolve_leave_conflict(&self, conflict: &LeaveConflict, last_error: Option<&str>) -> LeaveDecision {
        println!();
        println!("You have approved {} ({} to {})", conflict.leave_type, conflict.start_date, conflict.end_date);
        if !conflict.message.is_empty() {
            println!("  {}", conflict.message);
        }
        if let Some(error) = last_error {
            println!("  Could not cancel the leave: {}", error);
        }
        println!("Cancel today's leave and punch in? [y/N]");

        match self.input.next().await.as_deref() {
            Some("y") | Some("yes") => LeaveDecision::CancelLeaveAndPunch,
            _ => LeaveDecision::KeepLeave,
        }
    }

    async fn open_face_check(&self) -> VerificationLink {
        let (command_tx, commands) = mpsc::channel(8);
        let (events, event_rx) = mpsc::unbounded_channel();

        println!();
        println!("Face verification: Enter = capture, c = countdown, s = stop countdown, q = cancel");
        tokio::spawn(print_events(event_rx));
        tokio::spawn(forward_keys(self.input.clone(), command_tx));

        VerificationLink { commands, events }
    }

    fn stage_changed(&self, stage: PunchStage) {
        let text = match stage {
            PunchStage::AcquiringLocation => "Getting location...",
            PunchStage::LeaveCheck => "Checking leave...",
            PunchStage::FaceCheck => "Face verification required",
            PunchStage::Committing => "Submitting punch...",
            _ => return,
        };
        println!("{}", text);
    }
}

fn parse_key(line: &str) -> Option<VerificationCommand> {
    match line {
        "" => Some(VerificationCommand::CaptureNow),
        "c" => Some(VerificationCommand::StartCountdown),
        "s" => Some(VerificationCommand::StopCountdown),
        "q" => Some(VerificationCommand::Cancel),
        _ => None,
    }
}

async fn forward_keys(input: StdinLines, commands: mpsc::Sender<VerificationCommand>) {
    loop {
        let line = tokio::select! {
            _ = commands.closed() => return,
            line = input.next() => line,
        };
        let command = match line {
            Some(line) => match parse_key(&line) {
                Some(command) => command,
                None => continue,
            },
            None => VerificationCommand::Cancel,
        };
        if commands.send(command).await.is_err() {
            return;
        }
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<VerificationEvent>) {
    let mut last_guidance = "";
    while let Some(event) = events.recv().await {
        match event {
            VerificationEvent::Quality(report) => {
                let guidance = report.guidance();
                if guidance != last_guidance {
                    println!("  [{:>3}%] {}", report.overall_score, guidance);
                    last_guidance = guidance;
                }
            }
            VerificationEvent::State(VerificationState::CountingDown(n)) => println!("  {}...", n),
            VerificationEvent::State(VerificationState::Verifying) => println!("  Verifying..."),
            VerificationEvent::Message(text) => println!("  {}", text),
            _ => {}
        }
    }
}

pub fn print_remediation(error: &ClassifiedError) {
    println!("{}", error.title());
    println!("  {}", error.message());
    if !error.tips().is_empty() {
        println!("  Try:");
        for (i, tip) in error.tips().iter().enumerate() {
            println!("    {}. {}", i + 1, tip);
        }
    }
}

pub fn print_outcome(outcome: &PunchOutcome) {
    match outcome {
        PunchOutcome::Committed(receipt) => {
            println!("Punched {} successfully", receipt.direction);
            if !receipt.ack.message.is_empty() {
                println!("  {}", receipt.ack.message);
            }
            if let Some(result) = receipt.match_result {
                println!("  Face verified ({}% match)", result.confidence_rounded());
            }
            if let Some(today) = &receipt.today {
                println!(
                    "  Today: in {} / out {}",
                    today.punch_in.as_deref().unwrap_or("-"),
                    today.punch_out.as_deref().unwrap_or("-")
                );
            }
        }
        PunchOutcome::Aborted(reason) => println!("Punch cancelled ({:?})", reason),
        PunchOutcome::Failed(error) => print_remediation(error),
        PunchOutcome::Disabled => println!("Punching is currently disabled"),
    }
}

pub fn print_quality(report: &QualityReport) {
    println!("Quality: {}", report.summary());
    println!("  {}", report.guidance());
    for (check, message) in report.failing_checks() {
        println!("  - {:?}: {}", check, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bindings() {
        assert_eq!(parse_key(""), Some(VerificationCommand::CaptureNow));
        assert_eq!(parse_key("c"), Some(VerificationCommand::StartCountdown));
        assert_eq!(parse_key("q"), Some(VerificationCommand::Cancel));
        assert_eq!(parse_key("x"), None);
    }
}
