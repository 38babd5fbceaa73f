//! End-to-end flows through `FormSession` with in-memory collaborators.
//!
//! Time-dependent flows run on tokio's paused clock, so the 30 s upload wait
//! and the autosave interval elapse instantly.

mod common;

use common::{fill_valid, wait_uploads, ControlledStorage, Harness, HarnessBuilder, Release};
use intake_form::adapters::{FileKeyValueStore, MemorySubmissionStore, StaticAuth};
use intake_form::draft::DRAFT_KEY;
use intake_form::export::write_document;
use intake_form::ports::KeyValueStore;
use intake_form::session::MSG_SUBMIT_FAILED;
use intake_form::validate::{MSG_CV_FAILED, MSG_CV_TIMEOUT, MSG_CV_TOO_LARGE, MSG_EMAIL, MSG_REQUIRED};
use intake_form::{
    FieldName, GateBlock, GateOutcome, GateState, IntakeConfig, IntakeError, SelectedFile, Step,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ── Personal-info step ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn valid_form_advances_and_clears_draft() {
    let mut h = HarnessBuilder::default().build();
    h.session.start();
    assert_eq!(h.session.step(), Step::PersonalInfo);
    fill_valid(&mut h.session);

    // One autosave tick writes the draft.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(h.session.has_draft());
    assert!(h.session.last_saved().is_some());

    let outcome = assert_ok!(h.session.continue_personal().await);
    assert_eq!(outcome, GateOutcome::Advance);
    assert_eq!(h.session.step(), Step::Email);
    assert!(!h.session.has_draft());
    assert_eq!(assert_ok!(h.kv.get(DRAFT_KEY)), None);
}

#[tokio::test]
async fn empty_form_focuses_first_invalid_field() {
    let mut h = HarnessBuilder::default().build();
    h.session.start();
    h.session.set_field(FieldName::Phone, "+1 555 123 4567");

    let outcome = assert_ok!(h.session.continue_personal().await);
    let GateOutcome::Blocked(GateBlock::InvalidFields { focus, errors }) = outcome else {
        panic!("expected invalid fields, got {outcome:?}");
    };
    assert_eq!(focus, FieldName::FirstName);
    let fields: Vec<FieldName> = errors.iter().map(|(f, _)| *f).collect();
    assert_eq!(
        fields,
        vec![FieldName::FirstName, FieldName::LastName, FieldName::DateOfBirth]
    );
    // A full pass marks every field touched.
    assert_eq!(h.session.visible_error(FieldName::LastName), Some(MSG_REQUIRED));
    assert_eq!(h.session.step(), Step::PersonalInfo);
    assert!(h.session.gate_state().accepts_continue());
}

#[tokio::test]
async fn oversized_file_blocks_until_removed() {
    let mut h = HarnessBuilder::default().build();
    h.session.start();
    fill_valid(&mut h.session);

    let big = SelectedFile::new("portfolio.pdf", vec![0u8; 15 * 1024 * 1024]);
    let ids = h.session.select_files(vec![big]);
    assert_eq!(ids.len(), 1);

    let uploads = h.session.uploads();
    let record = uploads.get(&ids[0]).unwrap();
    assert!(record.error.as_ref().is_some_and(|e| e.is_size_rejection()));
    assert_eq!(record.error.as_ref().unwrap().to_string(), "File too large (max 10 MB)");
    assert!(h.store.all().is_empty());
    assert_eq!(h.session.visible_error(FieldName::Cv), Some(MSG_CV_TOO_LARGE));

    for _ in 0..2 {
        let outcome = assert_ok!(h.session.continue_personal().await);
        assert!(
            matches!(
                outcome,
                GateOutcome::Blocked(GateBlock::InvalidFields { focus: FieldName::Cv, .. })
            ),
            "got {outcome:?}"
        );
    }

    assert!(h.session.remove_upload(&ids[0]).is_some());
    assert_eq!(h.session.visible_error(FieldName::Cv), None);
    assert_eq!(
        assert_ok!(h.session.continue_personal().await),
        GateOutcome::Advance
    );
}

#[tokio::test]
async fn duplicate_selection_is_ignored() {
    let storage = Arc::new(ControlledStorage::default());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    h.session.start();

    let file = SelectedFile::new("cv.pdf", vec![1u8; 2048]);
    assert_eq!(h.session.select_files(vec![file.clone()]).len(), 1);
    assert!(h.session.select_files(vec![file]).is_empty());
    assert_eq!(h.session.uploads().len(), 1);
    storage.release_all(|| Release::Succeed);
}

#[tokio::test(start_paused = true)]
async fn stuck_upload_times_out_and_reenables_continue() {
    let storage = Arc::new(ControlledStorage::default());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    h.session.start();
    fill_valid(&mut h.session);

    h.session
        .select_files(vec![SelectedFile::new("cv.pdf", vec![7u8; 4096])]);
    wait_uploads(&h.session, |s| s.any_mid_progress()).await;
    assert_eq!(h.session.uploads().aggregate_progress(), 40);

    let started = tokio::time::Instant::now();
    let outcome = assert_ok!(h.session.continue_personal().await);
    assert_eq!(
        outcome,
        GateOutcome::Blocked(GateBlock::UploadTimeout { secs: 30 })
    );
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(h.session.gate_state().accepts_continue());
    assert_eq!(h.session.visible_error(FieldName::Cv), Some(MSG_CV_TIMEOUT));
    assert_eq!(h.session.step(), Step::PersonalInfo);
    assert_eq!(storage.pending().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn upload_finishing_during_wait_advances() {
    let storage = Arc::new(ControlledStorage::default());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    h.session.start();
    fill_valid(&mut h.session);

    h.session.select_files(vec![
        SelectedFile::new("cv.pdf", vec![1u8; 1000]),
        SelectedFile::new("letter.pdf", vec![2u8; 2000]),
    ]);
    wait_uploads(&h.session, |s| {
        s.records().iter().all(|r| r.is_mid_progress())
    })
    .await;

    let mut gate = h.session.subscribe_gate();
    let releaser = tokio::spawn({
        let storage = storage.clone();
        async move {
            gate.wait_for(|s| matches!(s, GateState::WaitingForUploads { .. }))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            storage.release_all(|| Release::Succeed)
        }
    });

    let outcome = assert_ok!(h.session.continue_personal().await);
    assert_eq!(outcome, GateOutcome::Advance);
    assert_eq!(releaser.await.unwrap(), 2);

    let urls = h.session.tracker().cv_urls();
    assert_eq!(urls.len(), 2);
    assert!(urls.iter().all(|u| u.starts_with("https://cdn.test/cvs/")));
}

#[tokio::test(start_paused = true)]
async fn upload_failing_during_wait_blocks() {
    let storage = Arc::new(ControlledStorage::default());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    h.session.start();
    fill_valid(&mut h.session);

    h.session
        .select_files(vec![SelectedFile::new("cv.pdf", vec![1u8; 1000])]);
    wait_uploads(&h.session, |s| s.any_mid_progress()).await;

    let storage_bg = storage.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        storage_bg.release_all(|| Release::Fail("connection reset".into()));
    });

    let outcome = assert_ok!(h.session.continue_personal().await);
    assert_eq!(outcome, GateOutcome::Blocked(GateBlock::UploadFailed));
    assert_eq!(h.session.visible_error(FieldName::Cv), Some(MSG_CV_FAILED));
    let uploads = h.session.uploads();
    assert_eq!(
        uploads.records()[0].error.as_ref().map(ToString::to_string),
        Some("Upload failed".to_string())
    );
}

// ── Drafts ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn draft_survives_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let kv = Arc::new(FileKeyValueStore::new(dir.path().join("store.json")));

    {
        let mut h = HarnessBuilder::default().kv(kv.clone()).build();
        h.session.start();
        h.session.set_field(FieldName::FirstName, "Ana");
        h.session.set_dob_day(Some(2));
        h.session.set_dob_month(Some(5));
        h.session.set_dob_year(Some(1990));
        h.session
            .select_files(vec![SelectedFile::new("cv.pdf", vec![3u8; 512])]);
        wait_uploads(&h.session, |s| !s.cv_urls().is_empty()).await;
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(h.session.has_draft());
    }

    let raw = assert_ok!(kv.get(DRAFT_KEY)).expect("draft written");
    assert!(raw.contains("\"firstName\":\"Ana\""));
    assert!(raw.contains("\"uploadedFiles\""));

    let mut h = HarnessBuilder::default().kv(kv).build();
    assert!(h.session.has_draft());
    h.session.start();
    assert_eq!(h.session.form().value(FieldName::FirstName), "Ana");
    assert_eq!(h.session.dob().month, Some(5));
    assert_eq!(h.session.uploads().cv_urls().len(), 1);
    assert!(h.session.uploads().records()[0].is_done());
}

#[tokio::test(start_paused = true)]
async fn reentering_personal_info_keeps_live_uploads() {
    let storage = Arc::new(ControlledStorage::default());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    h.session.start();
    fill_valid(&mut h.session);
    h.session
        .select_files(vec![SelectedFile::new("cv.pdf", vec![5u8; 1024])]);
    wait_uploads(&h.session, |s| s.any_mid_progress()).await;

    // The saved draft holds the record at 40 %.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(h.session.has_draft());

    h.session.go_home();
    assert_eq!(storage.release_all(|| Release::Succeed), 1);
    wait_uploads(&h.session, |s| !s.cv_urls().is_empty()).await;

    h.session.start();
    let uploads = h.session.uploads();
    assert!(uploads.records()[0].is_done());
    assert!(uploads.records()[0].error.is_none());
    assert_eq!(uploads.cv_urls().len(), 1);
    assert_eq!(
        assert_ok!(h.session.continue_personal().await),
        GateOutcome::Advance
    );
}

// ── Email step and submission ────────────────────────────────────────────────

/// Leave the personal-info step while one silent transfer sits at 0 %.
async fn advance_with_unstarted_upload(h: &mut Harness) {
    h.session.start();
    fill_valid(&mut h.session);
    h.session
        .select_files(vec![SelectedFile::new("cv.pdf", vec![4u8; 1024])]);
    assert!(h.session.uploads().any_in_flight());
    assert_eq!(
        assert_ok!(h.session.continue_personal().await),
        GateOutcome::Advance
    );
    h.session.set_email("ana@example.com");
}

#[tokio::test(start_paused = true)]
async fn submit_waits_for_transfer_still_attached() {
    let storage = Arc::new(ControlledStorage::silent());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    advance_with_unstarted_upload(&mut h).await;

    let releaser = tokio::spawn({
        let storage = storage.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            storage.release_all(|| Release::Succeed)
        }
    });
    assert_ok!(h.session.submit().await);
    assert_eq!(releaser.await.unwrap(), 1);

    let stored = h.store.all();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].data.cv_urls.len(), 1);
    assert_eq!(h.session.step(), Step::Done);
}

#[tokio::test(start_paused = true)]
async fn submit_refuses_transfer_that_fails_after_advance() {
    let storage = Arc::new(ControlledStorage::silent());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    advance_with_unstarted_upload(&mut h).await;

    let storage_bg = storage.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        storage_bg.release_all(|| Release::Fail("connection reset".into()));
    });

    let err = assert_err!(h.session.submit().await);
    let IntakeError::Validation { field, message } = err else {
        panic!("expected a CV validation error, got {err:?}");
    };
    assert_eq!(field, FieldName::Cv);
    assert_eq!(message, MSG_CV_FAILED);
    assert!(h.store.all().is_empty());
    assert_eq!(h.session.step(), Step::Email);
}

#[tokio::test(start_paused = true)]
async fn submit_refuses_transfer_that_never_finishes() {
    let storage = Arc::new(ControlledStorage::silent());
    let mut h = HarnessBuilder::default().storage(storage.clone()).build();
    advance_with_unstarted_upload(&mut h).await;

    let started = tokio::time::Instant::now();
    let err = assert_err!(h.session.submit().await);
    assert!(matches!(err, IntakeError::UploadTimeout { secs: 30 }), "got {err:?}");
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(h.store.all().is_empty());
    assert_eq!(h.session.step(), Step::Email);
    assert_eq!(storage.pending().len(), 1);
}

#[tokio::test]
async fn submit_stores_and_lands_on_done() {
    let mut h = HarnessBuilder::default().renderer(400, 1000).build();
    h.session.start();
    fill_valid(&mut h.session);
    h.session
        .select_files(vec![SelectedFile::new("cv.pdf", vec![9u8; 2048])]);
    wait_uploads(&h.session, |s| !s.cv_urls().is_empty()).await;
    assert_eq!(
        assert_ok!(h.session.continue_personal().await),
        GateOutcome::Advance
    );

    assert_eq!(h.session.set_email("ana@"), Some(MSG_EMAIL));
    let err = assert_err!(h.session.submit().await);
    assert!(matches!(err, IntakeError::Validation { field: FieldName::Email, .. }));

    assert_eq!(h.session.set_email("ana@example.com"), None);
    let id = assert_ok!(h.session.submit().await);
    assert_eq!(h.session.step(), Step::Done);

    let stored = h.store.all();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, id);
    assert_eq!(stored[0].data.first_name, "Ana");
    assert_eq!(stored[0].data.date_of_birth, "1990-05-02");
    assert_eq!(stored[0].data.email.as_deref(), Some("ana@example.com"));
    assert_eq!(stored[0].data.user_id.as_deref(), Some("user-ana"));
    assert_eq!(stored[0].data.cv_urls.len(), 1);

    assert_eq!(h.session.history().submissions.len(), 1);
    assert_eq!(h.session.history().total, 1);
    assert_eq!(h.session.last_submission().map(|s| s.id.as_str()), Some(id.as_str()));
    assert!(h.session.panel_open());
    assert_eq!(h.session.form().value(FieldName::FirstName), "");
    assert!(h.session.uploads().is_empty());

    // Preview and export the submission just made.
    let submission = h.session.last_submission().cloned().unwrap();
    let preview = assert_ok!(h.session.preview(&submission).await);
    assert_eq!(preview.filename, format!("submission_{id}.pdf"));
    let doc = assert_ok!(h.session.export(&preview).await);
    // At 400 px wide an A4 page holds about 566 px, so 1000 px take two pages.
    assert_eq!(doc.page_count, 2);
    let pdf = lopdf::Document::load_mem(&doc.bytes).unwrap();
    assert_eq!(pdf.get_pages().len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = assert_ok!(write_document(&doc, dir.path()).await);
    assert!(path.ends_with(format!("submission_{id}.pdf")));

    h.session.go_home();
    assert_eq!(h.session.step(), Step::Landing);
}

#[tokio::test]
async fn store_failure_keeps_email_step() {
    let store = Arc::new(MemorySubmissionStore::default());
    let mut h = HarnessBuilder::default().store(store.clone()).build();
    h.session.start();
    fill_valid(&mut h.session);
    assert_ok!(h.session.continue_personal().await);

    store.set_unavailable(true);
    let err = assert_err!(h.session.submit().await);
    assert!(matches!(err, IntakeError::RemoteOperationFailed { operation: "submit", .. }));
    assert_eq!(h.session.submit_error(), Some(MSG_SUBMIT_FAILED));
    assert_eq!(h.session.step(), Step::Email);

    store.set_unavailable(false);
    assert_ok!(h.session.submit().await);
    assert_eq!(h.session.submit_error(), None);
    assert_eq!(h.session.step(), Step::Done);
}

#[tokio::test]
async fn history_only_lists_own_submissions() {
    let store = Arc::new(MemorySubmissionStore::default());

    for (uid, email) in [("user-ana", "ana@example.com"), ("user-bo", "bo@example.com")] {
        let mut h = HarnessBuilder::default()
            .store(store.clone())
            .auth(StaticAuth::signed_in(uid, email))
            .build();
        h.session.start();
        fill_valid(&mut h.session);
        assert_ok!(h.session.continue_personal().await);
        assert_ok!(h.session.submit().await);
        assert_eq!(h.session.history().submissions.len(), 1);
        assert!(h.session.history().submissions[0].data.user_id.as_deref() == Some(uid));
    }

    let mut anonymous = HarnessBuilder::default()
        .store(store.clone())
        .auth(StaticAuth::anonymous())
        .build();
    anonymous.session.refresh_history().await;
    assert!(anonymous.session.history().submissions.is_empty());
    assert_eq!(anonymous.session.history().total, 2);
}

#[tokio::test]
async fn sign_out_returns_to_landing() {
    let mut h = HarnessBuilder::default().build();
    h.session.start();
    assert_eq!(h.session.user_email().as_deref(), Some("ana@example.com"));
    assert_ok!(h.session.sign_out().await);
    assert_eq!(h.session.step(), Step::Landing);
    assert_eq!(h.session.user_email(), None);
}

#[test]
fn small_upload_limit_is_configurable() {
    let config = IntakeConfig::builder()
        .max_upload_bytes(1024)
        .build()
        .unwrap();
    assert_eq!(config.max_upload_bytes, 1024);
}
