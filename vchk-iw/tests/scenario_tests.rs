//! End-to-end workflow scenarios
//!
//! Drives the orchestrator with scripted collaborators and an in-memory
//! database: capture/upload/analysis pipelines, signature gating, lock
//! idempotence, resumption, and stale-result discarding.

mod helpers;

use std::time::Duration;
use uuid::Uuid;
use vchk_common::events::InspectionEvent;

use helpers::{
    photo_bytes, wait_until, ScriptedStorage, TestHarness, UploadScript, VisionMode,
};
use vchk_iw::models::session::{InspectionKind, MetadataUpdate, SessionState};
use vchk_iw::models::signature::SignerRole;
use vchk_iw::models::step::{Severity, StepKind, ANALYSIS_UNAVAILABLE_SENTINEL};
use vchk_iw::services::orchestrator::ReviewAction;
use vchk_iw::workflow::analysis::AnalysisCoordinator;
use vchk_iw::workflow::WorkflowError;

const SIGNATURE_B64: &str = "c2lnbmF0dXJl";
const WAIT: Duration = Duration::from_secs(3);

const REQUIRED: [StepKind; 4] = [
    StepKind::Front,
    StepKind::Back,
    StepKind::Left,
    StepKind::Right,
];

async fn step_complete(harness: &TestHarness, session_id: Uuid, kind: StepKind) -> bool {
    let orchestrator = harness.orchestrator.clone();
    wait_until(
        move || {
            let orchestrator = orchestrator.clone();
            async move {
                let session = orchestrator.get(session_id).await.unwrap();
                session.sequencer.step(kind).unwrap().is_complete()
            }
        },
        WAIT,
    )
    .await
}

/// Capture all four required steps and wait for their uploads
async fn complete_required(harness: &TestHarness, session_id: Uuid) {
    for kind in REQUIRED {
        harness
            .orchestrator
            .capture_photo(session_id, kind, photo_bytes(kind.as_str()))
            .await
            .unwrap();
    }
    for kind in REQUIRED {
        assert!(
            step_complete(harness, session_id, kind).await,
            "step {} never completed",
            kind
        );
    }
}

#[tokio::test]
async fn full_inspection_reaches_lock_and_rejects_further_mutation() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    let mut rx = harness.event_bus.subscribe();

    complete_required(&harness, session_id).await;

    let session = harness.orchestrator.get(session_id).await.unwrap();
    assert!(session.sequencer.is_ready_for_signatures());
    assert_eq!(session.state, SessionState::InProgress);

    harness
        .orchestrator
        .record_signature(session_id, SignerRole::Operator, SIGNATURE_B64.to_string())
        .await
        .unwrap();
    let session = harness
        .orchestrator
        .record_signature(
            session_id,
            SignerRole::Counterparty,
            SIGNATURE_B64.to_string(),
        )
        .await
        .unwrap();
    assert_eq!(session.state, SessionState::AwaitingSignatures);

    let locked = harness.orchestrator.lock(session_id).await.unwrap();
    assert_eq!(locked.state, SessionState::Locked);
    assert!(locked.locked_at.is_some());

    // Every further mutation is rejected
    let err = harness
        .orchestrator
        .capture_photo(session_id, StepKind::Interior, photo_bytes("late"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SessionLocked));

    let err = harness
        .orchestrator
        .update_metadata(
            session_id,
            MetadataUpdate {
                notes: Some("late note".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SessionLocked));

    let err = harness
        .orchestrator
        .record_signature(session_id, SignerRole::Operator, SIGNATURE_B64.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SessionLocked));

    // A second lock fails and emits no duplicate event
    let err = harness.orchestrator.lock(session_id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::SessionLocked));

    let mut locked_events = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, InspectionEvent::SessionLocked { .. }) {
            locked_events += 1;
        }
    }
    assert_eq!(locked_events, 1);
}

#[tokio::test]
async fn terminal_upload_failure_rolls_back_and_recapture_recovers() {
    let harness = TestHarness::new(
        ScriptedStorage::new(vec![UploadScript::Terminal]),
        VisionMode::Normal,
    )
    .await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    harness
        .orchestrator
        .capture_photo(session_id, StepKind::Front, photo_bytes("front-1"))
        .await
        .unwrap();

    // The local asset is rolled back once the upload fails terminally
    let orchestrator = harness.orchestrator.clone();
    let rolled_back = wait_until(
        move || {
            let orchestrator = orchestrator.clone();
            async move {
                let session = orchestrator.get(session_id).await.unwrap();
                let step = session.sequencer.step(StepKind::Front).unwrap();
                step.local_asset.is_none() && !step.is_complete()
            }
        },
        WAIT,
    )
    .await;
    assert!(rolled_back, "terminal failure never rolled back");
    assert!(!harness
        .orchestrator
        .get(session_id)
        .await
        .unwrap()
        .sequencer
        .is_ready_for_signatures());

    // The operator recaptures; the scripted failure is exhausted
    harness
        .orchestrator
        .capture_photo(session_id, StepKind::Front, photo_bytes("front-2"))
        .await
        .unwrap();
    assert!(step_complete(&harness, session_id, StepKind::Front).await);

    // Other required steps still pending
    let session = harness.orchestrator.get(session_id).await.unwrap();
    assert!(!session.sequencer.is_ready_for_signatures());
}

#[tokio::test]
async fn transient_upload_failure_is_retried_automatically() {
    let harness = TestHarness::new(
        ScriptedStorage::new(vec![UploadScript::Transient]),
        VisionMode::Normal,
    )
    .await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Arrival, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    harness
        .orchestrator
        .capture_photo(session_id, StepKind::Front, photo_bytes("front"))
        .await
        .unwrap();

    assert!(step_complete(&harness, session_id, StepKind::Front).await);
    // First attempt failed transiently, the automatic retry succeeded
    assert_eq!(harness.storage.call_count(), 2);
}

#[tokio::test]
async fn offline_analysis_degrades_to_sentinel_and_step_stays_complete() {
    let harness = TestHarness::new(ScriptedStorage::always_ok(), VisionMode::Offline).await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    harness
        .orchestrator
        .capture_photo(session_id, StepKind::Back, photo_bytes("back"))
        .await
        .unwrap();

    let orchestrator = harness.orchestrator.clone();
    let sentinel_stored = wait_until(
        move || {
            let orchestrator = orchestrator.clone();
            async move {
                let session = orchestrator.get(session_id).await.unwrap();
                let step = session.sequencer.step(StepKind::Back).unwrap();
                step.is_complete()
                    && step.ai_description.as_deref() == Some(ANALYSIS_UNAVAILABLE_SENTINEL)
            }
        },
        WAIT,
    )
    .await;
    assert!(sentinel_stored);

    let session = harness.orchestrator.get(session_id).await.unwrap();
    let step = session.sequencer.step(StepKind::Back).unwrap();
    assert!(step.verdict.is_none());
    assert!(!step.description_approved);

    // The operator writes a manual description; the step was never blocked
    harness
        .orchestrator
        .review_description(
            session_id,
            StepKind::Back,
            ReviewAction::Edit {
                text: "Rear bumper clean, minor dust".to_string(),
            },
        )
        .await
        .unwrap();

    let session = harness.orchestrator.get(session_id).await.unwrap();
    let step = session.sequencer.step(StepKind::Back).unwrap();
    assert!(step.description_approved);
    assert_eq!(
        step.ai_description.as_deref(),
        Some("Rear bumper clean, minor dust")
    );
}

#[tokio::test]
async fn partial_analysis_stores_only_the_available_side() {
    let harness = TestHarness::new(ScriptedStorage::always_ok(), VisionMode::DescribeOnly).await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    harness
        .orchestrator
        .capture_photo(session_id, StepKind::Right, photo_bytes("right"))
        .await
        .unwrap();

    let orchestrator = harness.orchestrator.clone();
    let described = wait_until(
        move || {
            let orchestrator = orchestrator.clone();
            async move {
                let session = orchestrator.get(session_id).await.unwrap();
                let step = session.sequencer.step(StepKind::Right).unwrap();
                step.is_complete() && step.ai_description.is_some()
            }
        },
        WAIT,
    )
    .await;
    assert!(described);

    let session = harness.orchestrator.get(session_id).await.unwrap();
    let step = session.sequencer.step(StepKind::Right).unwrap();
    // Detection was offline: verdict stays null, no sentinel involved
    assert!(step.verdict.is_none());
    assert_ne!(
        step.ai_description.as_deref(),
        Some(ANALYSIS_UNAVAILABLE_SENTINEL)
    );
}

#[tokio::test]
async fn retake_discards_verdict_and_stale_analysis_is_ignored() {
    let harness = TestHarness::new(ScriptedStorage::always_ok(), VisionMode::SevereDamage).await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    harness
        .orchestrator
        .capture_photo(session_id, StepKind::Left, photo_bytes("left-1"))
        .await
        .unwrap();

    // Wait for the severe-damage verdict to land
    let orchestrator = harness.orchestrator.clone();
    let verdict_stored = wait_until(
        move || {
            let orchestrator = orchestrator.clone();
            async move {
                let session = orchestrator.get(session_id).await.unwrap();
                session
                    .sequencer
                    .step(StepKind::Left)
                    .unwrap()
                    .verdict
                    .as_ref()
                    .map(|v| v.severity == Some(Severity::Severe))
                    .unwrap_or(false)
            }
        },
        WAIT,
    )
    .await;
    assert!(verdict_stored);

    let session = harness.orchestrator.get(session_id).await.unwrap();
    let old_token = session
        .sequencer
        .step(StepKind::Left)
        .unwrap()
        .capture_token
        .unwrap();

    // Retake discards the verdict
    harness
        .orchestrator
        .retake_photo(session_id, StepKind::Left)
        .await
        .unwrap();
    let session = harness.orchestrator.get(session_id).await.unwrap();
    assert!(session.sequencer.step(StepKind::Left).unwrap().verdict.is_none());

    // A late analysis response tagged with the superseded token arrives
    let coordinator = AnalysisCoordinator::new(
        harness.pool.clone(),
        harness.event_bus.clone(),
        harness.vision.clone(),
        harness.vision.clone(),
    );
    coordinator
        .analyze_step(session_id, StepKind::Left, old_token, b"left-1")
        .await;

    // It is discarded: the retaken step stays empty
    let session = harness.orchestrator.get(session_id).await.unwrap();
    let step = session.sequencer.step(StepKind::Left).unwrap();
    assert!(step.verdict.is_none());
    assert!(step.ai_description.is_none());
}

#[tokio::test]
async fn duplicate_start_reports_the_open_session() {
    let harness = TestHarness::default().await;
    let subject = Uuid::new_v4();

    let first = harness
        .orchestrator
        .start(subject, InspectionKind::Departure, None)
        .await
        .unwrap();

    // Same subject+kind is rejected with the session to resume
    let err = harness
        .orchestrator
        .start(subject, InspectionKind::Departure, None)
        .await
        .unwrap_err();
    match err {
        WorkflowError::DuplicateOpenSession { existing } => {
            assert_eq!(existing, first.session_id);
        }
        other => panic!("expected DuplicateOpenSession, got {:?}", other),
    }

    // A different kind for the same subject is independent
    harness
        .orchestrator
        .start(subject, InspectionKind::Arrival, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn locked_session_frees_the_subject_for_a_new_inspection() {
    let harness = TestHarness::default().await;
    let subject = Uuid::new_v4();

    let session = harness
        .orchestrator
        .start(subject, InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    complete_required(&harness, session_id).await;
    harness
        .orchestrator
        .record_signature(session_id, SignerRole::Operator, SIGNATURE_B64.to_string())
        .await
        .unwrap();
    harness
        .orchestrator
        .record_signature(
            session_id,
            SignerRole::Counterparty,
            SIGNATURE_B64.to_string(),
        )
        .await
        .unwrap();
    harness.orchestrator.lock(session_id).await.unwrap();

    // The locked record is retained; a fresh departure can begin
    let second = harness
        .orchestrator
        .start(subject, InspectionKind::Departure, None)
        .await
        .unwrap();
    assert_ne!(second.session_id, session_id);
    assert!(harness
        .orchestrator
        .get(session_id)
        .await
        .unwrap()
        .is_locked());
}

#[tokio::test]
async fn resumption_reproduces_steps_metadata_and_cursor() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    // Two of four required steps done, plus metadata and a cursor move
    for kind in [StepKind::Front, StepKind::Back] {
        harness
            .orchestrator
            .capture_photo(session_id, kind, photo_bytes(kind.as_str()))
            .await
            .unwrap();
        assert!(step_complete(&harness, session_id, kind).await);
    }
    harness
        .orchestrator
        .update_metadata(
            session_id,
            MetadataUpdate {
                fuel_level: Some(60),
                odometer_km: Some(48_213),
                notes: Some("small chip on windshield".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let before = harness.orchestrator.get(session_id).await.unwrap();

    // "Restart": a fresh orchestrator over the same persisted store
    let resumed_orchestrator = vchk_iw::services::InspectionOrchestrator::new(
        harness.pool.clone(),
        harness.event_bus.clone(),
        harness.storage.clone(),
        harness.vision.clone(),
        harness.vision.clone(),
        std::sync::Arc::new(vchk_iw::services::geolocation::NoGeolocation),
        harness.spool.path().to_path_buf(),
        1,
    );
    let resumed = resumed_orchestrator.get(session_id).await.unwrap();

    assert_eq!(resumed.state, before.state);
    assert_eq!(resumed.sequencer.cursor(), before.sequencer.cursor());
    assert_eq!(resumed.fuel_level, Some(60));
    assert_eq!(resumed.odometer_km, Some(48_213));
    assert_eq!(resumed.notes.as_deref(), Some("small chip on windshield"));
    for (restored, original) in resumed
        .sequencer
        .steps()
        .iter()
        .zip(before.sequencer.steps())
    {
        assert_eq!(restored.is_complete(), original.is_complete());
        assert_eq!(restored.ai_description, original.ai_description);
        assert_eq!(restored.description_approved, original.description_approved);
        assert_eq!(restored.remote_url, original.remote_url);
    }
}

#[tokio::test]
async fn startup_recovery_clears_interrupted_uploads() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), InspectionKind::Departure, None)
        .await
        .unwrap();
    let session_id = session.session_id;

    // Simulate a capture whose upload task died with the process
    let mut interrupted = harness.orchestrator.get(session_id).await.unwrap();
    interrupted
        .sequencer
        .step_mut(StepKind::Front)
        .unwrap()
        .begin_capture("spool/front-dead.jpg".to_string());
    vchk_iw::db::sessions::save_session(&harness.pool, &interrupted)
        .await
        .unwrap();

    let recovered = vchk_iw::db::steps::recover_interrupted_uploads(&harness.pool)
        .await
        .unwrap();
    assert_eq!(recovered, 1);

    // The marker is gone and the operator will be re-prompted
    let session = harness.orchestrator.get(session_id).await.unwrap();
    let step = session.sequencer.step(StepKind::Front).unwrap();
    assert!(step.local_asset.is_none());
    assert!(step.capture_token.is_none());
    assert!(!step.is_complete());

    // Completed steps are untouched by recovery
    harness
        .orchestrator
        .capture_photo(session_id, StepKind::Back, photo_bytes("back"))
        .await
        .unwrap();
    assert!(step_complete(&harness, session_id, StepKind::Back).await);
    let recovered = vchk_iw::db::steps::recover_interrupted_uploads(&harness.pool)
        .await
        .unwrap();
    assert_eq!(recovered, 0);
}
