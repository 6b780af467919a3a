mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{descriptor, office, FakeAttendance, FakeLeaves, RigBuilder, ScriptedLocation, ScriptedUser};
use punchguard::common::{CameraError, LocationError, PunchError};
use punchguard::core::PunchErrorCategory;
use punchguard::flow::{AbortReason, Direction, LeaveDecision, PunchOutcome, PunchRequest, PunchStage};
use punchguard::camera::StillImageCamera;

fn failed_category(outcome: &PunchOutcome) -> PunchErrorCategory {
    match outcome {
        PunchOutcome::Failed(error) => error.category,
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn punch_in_without_enrollment_skips_face_check() {
    let rig = RigBuilder::default().build();
    let user = ScriptedUser::capturing();

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::In), &user).await.unwrap();

    let PunchOutcome::Committed(receipt) = outcome else {
        panic!("expected commit");
    };
    assert!(!receipt.face_verified);
    assert_eq!(receipt.coordinates, office());

    let submissions = rig.attendance.submissions.lock().unwrap().clone();
    assert_eq!(submissions.len(), 1);
    assert!(!submissions[0].face_verified);
    assert_eq!(rig.camera.open_count(), 0);
    assert_eq!(user.face_checks.load(Ordering::SeqCst), 0);
    assert!(!user.stages().contains(&PunchStage::FaceCheck));
}

#[tokio::test(start_paused = true)]
async fn punch_in_with_matching_face_commits_verified() {
    let rig = RigBuilder {
        enrolled: Some(descriptor(0.0).to_json()),
        live: descriptor(0.3),
        ..RigBuilder::default()
    }
    .build();
    let user = ScriptedUser::capturing();

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::In), &user).await.unwrap();

    let PunchOutcome::Committed(receipt) = outcome else {
        panic!("expected commit");
    };
    let result = receipt.match_result.expect("match result");
    assert!(result.matched);
    assert_eq!(result.confidence_rounded(), 50);
    assert!(receipt.face_verified);
    assert!(receipt.today.as_ref().is_some_and(|t| t.punched_in()));

    assert!(rig.attendance.submissions.lock().unwrap()[0].face_verified);
    assert_eq!(rig.camera.active_streams(), 0);
    assert_eq!(
        user.stages(),
        vec![
            PunchStage::Start,
            PunchStage::AcquiringLocation,
            PunchStage::LeaveCheck,
            PunchStage::FaceCheck,
            PunchStage::Committing,
            PunchStage::Done
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn keeping_leave_aborts_without_side_effects() {
    let rig = RigBuilder {
        leaves: FakeLeaves::with_conflict(),
        enrolled: Some(descriptor(0.0).to_json()),
        ..RigBuilder::default()
    }
    .build();
    let user = ScriptedUser::deciding(&[LeaveDecision::KeepLeave]);

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::In), &user).await.unwrap();

    assert_eq!(outcome, PunchOutcome::Aborted(AbortReason::LeaveKept));
    assert!(rig.attendance.submissions.lock().unwrap().is_empty());
    assert!(rig.leaves.cancelled.lock().unwrap().is_empty());
    assert_eq!(rig.camera.open_count(), 0);
    assert!(!rig.orchestrator.is_busy());
}

#[tokio::test(start_paused = true)]
async fn failed_leave_cancellation_reprompts_with_same_location() {
    let leaves = FakeLeaves::with_conflict();
    leaves
        .cancel_results
        .lock()
        .unwrap()
        .push_back(Err(PunchError::Rejected("Leave already started".to_string())));
    let rig = RigBuilder { leaves, ..RigBuilder::default() }.build();
    let user = ScriptedUser::deciding(&[LeaveDecision::CancelLeaveAndPunch, LeaveDecision::CancelLeaveAndPunch]);

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::In), &user).await.unwrap();

    assert!(matches!(outcome, PunchOutcome::Committed(_)));
    assert_eq!(
        *user.leave_errors_seen.lock().unwrap(),
        vec![None, Some("Leave already started".to_string())]
    );
    assert_eq!(rig.leaves.cancelled.lock().unwrap().len(), 1);
    assert_eq!(rig.leaves.cancelled.lock().unwrap()[0].0, 7);
    assert_eq!(rig.location.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_verification_releases_camera_and_commits_nothing() {
    let rig = RigBuilder {
        enrolled: Some(descriptor(0.0).to_json()),
        ..RigBuilder::default()
    }
    .build();
    let user = ScriptedUser::cancelling();

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::In), &user).await.unwrap();

    assert_eq!(outcome, PunchOutcome::Aborted(AbortReason::VerificationCancelled));
    assert_eq!(rig.camera.open_count(), 1);
    assert_eq!(rig.camera.active_streams(), 0);
    assert!(rig.attendance.submissions.lock().unwrap().is_empty());
    assert_eq!(user.stages().last(), Some(&PunchStage::Aborted));

    // A fresh attempt starts over from location.
    let retry = ScriptedUser::capturing();
    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::In), &retry).await.unwrap();
    assert!(matches!(outcome, PunchOutcome::Committed(_)));
    assert_eq!(rig.location.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn camera_permission_denied_is_classified() {
    let rig = RigBuilder {
        enrolled: Some(descriptor(0.0).to_json()),
        camera: StillImageCamera::failing(CameraError::PermissionDenied),
        ..RigBuilder::default()
    }
    .build();
    let user = ScriptedUser::capturing();

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::In), &user).await.unwrap();

    // "permission denied" is the first rule, so camera denial shares the
    // location-permission bucket.
    assert_eq!(failed_category(&outcome), PunchErrorCategory::LocationPermissionDenied);
    assert!(rig.attendance.submissions.lock().unwrap().is_empty());
    assert_eq!(user.stages().last(), Some(&PunchStage::Failed));
}

#[tokio::test(start_paused = true)]
async fn slow_location_times_out() {
    let rig = RigBuilder {
        location: ScriptedLocation::slow(office(), Duration::from_secs(3600)),
        ..RigBuilder::default()
    }
    .build();

    let outcome = rig
        .orchestrator
        .punch(PunchRequest::new(Direction::Out), &ScriptedUser::default())
        .await
        .unwrap();

    assert_eq!(failed_category(&outcome), PunchErrorCategory::LocationUnavailable);
    assert!(rig.attendance.submissions.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn location_permission_denied_is_fatal() {
    let rig = RigBuilder {
        location: ScriptedLocation::failing(LocationError::PermissionDenied),
        ..RigBuilder::default()
    }
    .build();

    let outcome = rig
        .orchestrator
        .punch(PunchRequest::new(Direction::In), &ScriptedUser::default())
        .await
        .unwrap();

    assert_eq!(failed_category(&outcome), PunchErrorCategory::LocationPermissionDenied);
    assert_eq!(rig.leaves.checks.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn server_rejection_is_classified_verbatim() {
    let attendance = FakeAttendance::default();
    *attendance.reject_with.lock().unwrap() = Some("You have already punched in today".to_string());
    let rig = RigBuilder { attendance, ..RigBuilder::default() }.build();

    let outcome = rig
        .orchestrator
        .punch(PunchRequest::new(Direction::In), &ScriptedUser::default())
        .await
        .unwrap();

    let PunchOutcome::Failed(error) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(error.category, PunchErrorCategory::AlreadyPunched);
    assert_eq!(error.raw_message, "You have already punched in today");
}

#[tokio::test(start_paused = true)]
async fn slow_commit_times_out_as_network_failure() {
    let rig = RigBuilder {
        attendance: FakeAttendance::slow(Duration::from_secs(3600)),
        ..RigBuilder::default()
    }
    .build();
    let user = ScriptedUser::default();

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::Out), &user).await.unwrap();

    let PunchOutcome::Failed(error) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(error.category, PunchErrorCategory::NetworkUnavailable);
    assert_eq!(error.raw_message, "Request timeout. Please check your connection.");
    assert!(rig.attendance.submissions.lock().unwrap().is_empty());
    assert_eq!(user.stages().last(), Some(&PunchStage::Failed));
    assert!(!rig.orchestrator.is_busy());
}

#[tokio::test(start_paused = true)]
async fn punch_out_skips_leave_and_face_checks() {
    let rig = RigBuilder {
        leaves: FakeLeaves::with_conflict(),
        enrolled: Some(descriptor(0.0).to_json()),
        ..RigBuilder::default()
    }
    .build();
    let user = ScriptedUser::default();

    let outcome = rig.orchestrator.punch(PunchRequest::new(Direction::Out), &user).await.unwrap();

    assert!(matches!(outcome, PunchOutcome::Committed(ref r) if !r.face_verified));
    assert_eq!(rig.leaves.checks.load(Ordering::SeqCst), 0);
    assert_eq!(rig.camera.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn status_refresh_failure_does_not_undo_commit() {
    let attendance = FakeAttendance::default();
    *attendance.status_fails.lock().unwrap() = true;
    let rig = RigBuilder { attendance, ..RigBuilder::default() }.build();

    let outcome = rig
        .orchestrator
        .punch(PunchRequest::new(Direction::Out), &ScriptedUser::default())
        .await
        .unwrap();

    let PunchOutcome::Committed(receipt) = outcome else {
        panic!("expected commit");
    };
    assert!(receipt.today.is_none());
    assert_eq!(rig.attendance.submissions.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_trigger_does_nothing() {
    let rig = RigBuilder::default().build();
    let request = PunchRequest { direction: Direction::In, disabled: true };

    let outcome = rig.orchestrator.punch(request, &ScriptedUser::default()).await.unwrap();

    assert_eq!(outcome, PunchOutcome::Disabled);
    assert_eq!(rig.location.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn second_concurrent_attempt_is_refused() {
    let rig = RigBuilder {
        location: ScriptedLocation::slow(office(), Duration::from_secs(1)),
        ..RigBuilder::default()
    }
    .build();
    let first_user = ScriptedUser::default();
    let second_user = ScriptedUser::default();

    let (first, second) = tokio::join!(
        rig.orchestrator.punch(PunchRequest::new(Direction::Out), &first_user),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            rig.orchestrator.punch(PunchRequest::new(Direction::Out), &second_user).await
        }
    );

    assert!(matches!(first.unwrap(), PunchOutcome::Committed(_)));
    assert!(matches!(second, Err(PunchError::AttemptInProgress)));
    assert_eq!(rig.attendance.submissions.lock().unwrap().len(), 1);
    assert!(!rig.orchestrator.is_busy());
}
