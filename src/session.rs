//! The form orchestrator.
//!
//! [`FormSession`] sequences the wizard (landing → personal info → email →
//! done) and composes the validator, upload tracker, draft persistence, step
//! gate and exporter. Collaborator failures never escape as panics: they are
//! logged, stored as user-facing messages and returned as
//! [`IntakeError::RemoteOperationFailed`].

use crate::config::IntakeConfig;
use crate::draft::{snapshot, Autosaver, DraftStore, UiPreferences};
use crate::error::IntakeError;
use crate::export::{self, ExportedDocument, Preview};
use crate::gate::{GateCancel, GateOutcome, GateState, StepGate};
use crate::model::{DobParts, FieldName, FormData, SelectedFile, Submission, UploadRecord};
use crate::ports::{AuthProvider, BlobStorage, KeyValueStore, SnapshotRenderer, SubmissionStore};
use crate::upload::{UploadSet, UploadTracker};
use crate::validate::{sanitize_name, validate, validate_email, FieldFeedback, MSG_CV_TIMEOUT};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Shown when the store rejects a submission.
pub const MSG_SUBMIT_FAILED: &str = "Failed to submit form. Please try again.";

/// Shown when the submission history cannot be loaded.
pub const MSG_HISTORY_FAILED: &str = "Failed to load submissions.";

/// Wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Landing,
    PersonalInfo,
    Email,
    Done,
}

/// The collaborators a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SubmissionStore>,
    pub storage: Arc<dyn BlobStorage>,
    pub auth: Arc<dyn AuthProvider>,
    pub kv: Arc<dyn KeyValueStore>,
    /// Needed only for preview/export.
    pub renderer: Option<Arc<dyn SnapshotRenderer>>,
}

/// The current user's recent submissions.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub submissions: Vec<Submission>,
    /// Count across all users, as reported by the store.
    pub total: u64,
    pub error: Option<String>,
}

pub struct FormSession {
    config: IntakeConfig,
    step: Step,
    form: Arc<Mutex<FormData>>,
    dob: DobParts,
    feedback: FieldFeedback,
    email_error: Option<&'static str>,
    submit_error: Option<String>,
    tracker: UploadTracker,
    gate: StepGate,
    drafts: DraftStore,
    prefs: UiPreferences,
    autosaver: Option<Autosaver>,
    last_saved: Option<DateTime<Utc>>,
    history: History,
    last_submission: Option<Submission>,
    panel_open: bool,
    store: Arc<dyn SubmissionStore>,
    auth: Arc<dyn AuthProvider>,
    renderer: Option<Arc<dyn SnapshotRenderer>>,
}

fn lock(form: &Mutex<FormData>) -> MutexGuard<'_, FormData> {
    form.lock().unwrap_or_else(|e| e.into_inner())
}

impl FormSession {
    pub fn new(config: IntakeConfig, collaborators: Collaborators) -> Self {
        let prefs = UiPreferences::new(Arc::clone(&collaborators.kv));
        Self {
            tracker: UploadTracker::new(collaborators.storage, &config),
            gate: StepGate::new(config.upload_wait_timeout()),
            drafts: DraftStore::new(collaborators.kv),
            panel_open: prefs.panel_open(),
            prefs,
            config,
            step: Step::Landing,
            form: Arc::new(Mutex::new(FormData::default())),
            dob: DobParts::default(),
            feedback: FieldFeedback::default(),
            email_error: None,
            submit_error: None,
            autosaver: None,
            last_saved: None,
            history: History::default(),
            last_submission: None,
            store: collaborators.store,
            auth: collaborators.auth,
            renderer: collaborators.renderer,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn form(&self) -> FormData {
        lock(&self.form).clone()
    }

    pub fn dob(&self) -> DobParts {
        self.dob
    }

    pub fn feedback(&self) -> &FieldFeedback {
        &self.feedback
    }

    /// The error to display under `field`, once it has been touched.
    pub fn visible_error(&self, field: FieldName) -> Option<&str> {
        match field {
            FieldName::Email => self.email_error,
            _ => self.feedback.visible_error(field),
        }
    }

    pub fn uploads(&self) -> UploadSet {
        self.tracker.snapshot()
    }

    pub fn tracker(&self) -> &UploadTracker {
        &self.tracker
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn subscribe_gate(&self) -> watch::Receiver<GateState> {
        self.gate.subscribe()
    }

    /// Handle that abandons a pending upload wait of
    /// [`continue_personal`](Self::continue_personal).
    pub fn gate_cancel(&self) -> GateCancel {
        self.gate.cancel_handle()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn last_submission(&self) -> Option<&Submission> {
        self.last_submission.as_ref()
    }

    pub fn panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    /// When the draft was last written, by autosave or on leaving the step.
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.autosaver
            .as_ref()
            .and_then(Autosaver::last_saved)
            .or(self.last_saved)
    }

    pub fn user_email(&self) -> Option<String> {
        self.auth.email()
    }

    /// Whether the landing page should offer "Continue" instead of "Start".
    pub fn has_draft(&self) -> bool {
        self.drafts.exists()
    }

    // ── Step transitions ──────────────────────────────────────────────────

    /// Leave the landing page for the personal-info step.
    pub fn start(&mut self) {
        self.enter_personal_info();
    }

    fn enter_personal_info(&mut self) {
        info!("Entering personal-info step");
        self.step = Step::PersonalInfo;
        self.gate.reset();
        self.restore_draft();

        let form = Arc::clone(&self.form);
        let tracker = self.tracker.clone();
        self.autosaver = Some(Autosaver::spawn(
            self.config.autosave_interval(),
            self.drafts.clone(),
            move || snapshot(&lock(&form), &tracker.snapshot()),
        ));
    }

    fn restore_draft(&mut self) {
        let Some(draft) = self.drafts.load() else {
            return;
        };
        debug!(
            "Restoring draft with {} upload record(s)",
            draft.uploaded_files.len()
        );
        if let Some(parts) = draft.form.date_of_birth.as_deref().and_then(DobParts::split) {
            self.dob = parts;
        }
        lock(&self.form).merge_from(draft.form);

        // Records still tracked from an earlier visit are newer than any draft.
        let live = self.tracker.snapshot();
        if live.is_empty() && live.cv_urls().is_empty() {
            self.tracker.restore(draft.uploaded_files, draft.cv_urls);
        } else {
            debug!("Keeping {} live upload record(s) over the draft copy", live.len());
        }
    }

    /// Tear down the personal-info step: stop autosave and any pending wait.
    fn leave_personal_info(&mut self) {
        self.gate.cancel_handle().cancel();
        if let Some(saver) = self.autosaver.take() {
            self.last_saved = saver.last_saved().or(self.last_saved);
            saver.stop();
        }
    }

    /// Attempt to leave the personal-info step.
    ///
    /// On [`GateOutcome::Advance`] the draft is deleted and the session moves
    /// to the email step. Otherwise the step stays and the feedback holds the
    /// errors to show.
    pub async fn continue_personal(&mut self) -> Result<GateOutcome, IntakeError> {
        if self.step != Step::PersonalInfo {
            return Err(IntakeError::Internal(format!(
                "continue requested on the {:?} step",
                self.step
            )));
        }
        let form = self.form();
        let outcome = self
            .gate
            .request_continue(&form, &self.tracker, &mut self.feedback)
            .await;

        if outcome == GateOutcome::Advance {
            self.leave_personal_info();
            self.drafts.clear();
            self.step = Step::Email;
            self.gate.reset();
            info!("Personal info accepted, moving to email step");
        }
        Ok(outcome)
    }

    /// Return to the landing page.
    pub fn go_home(&mut self) {
        if self.step == Step::PersonalInfo {
            self.leave_personal_info();
        }
        self.step = Step::Landing;
    }

    /// From the done page, begin another submission.
    pub fn start_new_form(&mut self) {
        self.enter_personal_info();
    }

    // ── Field input ───────────────────────────────────────────────────────

    /// Apply a keystroke-level change and validate it.
    ///
    /// Name fields are filtered first; other values are stored verbatim.
    /// Returns the current error of the field (shown only once touched).
    pub fn set_field(&mut self, field: FieldName, raw: &str) -> Option<&str> {
        if field == FieldName::Cv {
            return self.refresh_cv();
        }
        if field == FieldName::Email {
            return self.set_email(raw);
        }
        let value = if field.is_name() {
            sanitize_name(raw)
        } else {
            raw.to_string()
        };
        lock(&self.form).set(field, value.as_str());
        self.record(field, &value)
    }

    /// The user left `field`: mark it touched and normalise names.
    pub fn blur(&mut self, field: FieldName) -> Option<&str> {
        if field == FieldName::Cv {
            self.feedback.touch(field);
            return self.refresh_cv();
        }
        let value = {
            let mut form = lock(&self.form);
            if field.is_name() {
                let trimmed = form.value(field).trim().to_string();
                form.set(field, trimmed.as_str());
            }
            form.value(field).to_string()
        };
        self.feedback.touch(field);
        self.record(field, &value)
    }

    pub fn set_dob_day(&mut self, day: Option<u32>) -> Option<&str> {
        self.dob.day = day.filter(|d| DobParts::DAYS.contains(d));
        self.sync_dob()
    }

    pub fn set_dob_month(&mut self, month: Option<u32>) -> Option<&str> {
        self.dob.month = month.filter(|m| DobParts::MONTHS.contains(m));
        self.sync_dob()
    }

    pub fn set_dob_year(&mut self, year: Option<i32>) -> Option<&str> {
        self.dob.year = year.filter(|y| DobParts::year_options().any(|o| o == *y));
        self.sync_dob()
    }

    fn sync_dob(&mut self) -> Option<&str> {
        match self.dob.compose() {
            Some(value) => {
                lock(&self.form).set(FieldName::DateOfBirth, value.as_str());
                self.feedback.touch(FieldName::DateOfBirth);
                self.record(FieldName::DateOfBirth, &value)
            }
            // Incomplete selectors leave the stored date untouched.
            None => None,
        }
    }

    fn record(&mut self, field: FieldName, value: &str) -> Option<&str> {
        let error = validate(field, value, &self.tracker.snapshot());
        self.feedback.record(field, error.as_deref());
        self.feedback.error(field)
    }

    // ── Uploads ───────────────────────────────────────────────────────────

    /// Track and start uploading picked files.
    pub fn select_files(&mut self, files: Vec<SelectedFile>) -> Vec<String> {
        let ids = self.tracker.select(files);
        self.feedback.touch(FieldName::Cv);
        self.refresh_cv();
        ids
    }

    pub fn remove_upload(&mut self, id: &str) -> Option<UploadRecord> {
        let removed = self.tracker.remove_upload(id);
        self.refresh_cv();
        removed
    }

    /// Re-validate the CV field against the tracker's current state.
    pub fn refresh_cv(&mut self) -> Option<&str> {
        self.record(FieldName::Cv, "")
    }

    // ── Email and submission ──────────────────────────────────────────────

    pub fn set_email(&mut self, email: &str) -> Option<&'static str> {
        lock(&self.form).set(FieldName::Email, email);
        self.email_error = validate_email(email);
        self.email_error
    }

    /// Persist the submission and move to the done page.
    ///
    /// Transfers still attached are given the upload wait timeout to finish;
    /// the submission is refused while any record is failed or unresolved.
    /// Returns the identifier the store assigned.
    pub async fn submit(&mut self) -> Result<String, IntakeError> {
        if self.step != Step::Email {
            return Err(IntakeError::Internal(format!(
                "submit requested on the {:?} step",
                self.step
            )));
        }
        let form = self.form();
        if let Some(message) = validate_email(form.value(FieldName::Email)) {
            self.email_error = Some(message);
            return Err(IntakeError::Validation {
                field: FieldName::Email,
                message: message.to_string(),
            });
        }
        self.settle_uploads().await?;

        self.submit_error = None;
        let record = form.to_submission(self.tracker.cv_urls(), self.auth.user_id(), Utc::now());
        let id = match self.store.create(record).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Submission failed: {}", e);
                self.submit_error = Some(MSG_SUBMIT_FAILED.to_string());
                return Err(IntakeError::RemoteOperationFailed {
                    operation: "submit",
                    message: e.to_string(),
                });
            }
        };
        info!("Stored submission {}", id);

        self.refresh_history().await;
        self.last_submission = self
            .history
            .submissions
            .iter()
            .find(|s| s.id == id)
            .or_else(|| self.history.submissions.first())
            .cloned();
        self.set_panel(true);
        self.reset_form();
        self.step = Step::Done;
        Ok(id)
    }

    /// Wait for attached transfers, then check that every record is usable.
    async fn settle_uploads(&mut self) -> Result<(), IntakeError> {
        if self.tracker.snapshot().any_in_flight() {
            debug!("Waiting for uploads before submitting");
            let wait = self.config.upload_wait_timeout();
            if tokio::time::timeout(wait, self.tracker.wait_idle()).await.is_err() {
                warn!("Uploads still running after {:?}, submission refused", wait);
                self.feedback.record(FieldName::Cv, Some(MSG_CV_TIMEOUT));
                return Err(IntakeError::UploadTimeout {
                    secs: wait.as_secs(),
                });
            }
        }

        let uploads = self.tracker.snapshot();
        if let Some(message) = validate(FieldName::Cv, "", &uploads) {
            warn!("Submission refused: {}", message);
            self.feedback.record(FieldName::Cv, Some(message.as_ref()));
            return Err(IntakeError::Validation {
                field: FieldName::Cv,
                message: message.into_owned(),
            });
        }
        Ok(())
    }

    fn reset_form(&mut self) {
        *lock(&self.form) = FormData::default();
        self.dob = DobParts::default();
        self.feedback.clear();
        self.email_error = None;
        self.tracker.clear();
    }

    /// Reload the current user's recent submissions and the global count.
    ///
    /// Failures leave an error message on the history instead of returning.
    pub async fn refresh_history(&mut self) {
        let user = self.auth.user_id();
        let recent = self.store.recent(self.config.history_limit).await;
        let total = self.store.count().await;

        match (recent, total) {
            (Ok(rows), Ok(total)) => {
                let submissions: Vec<Submission> = rows
                    .into_iter()
                    .filter(|s| user.is_some() && s.data.user_id == user)
                    .collect();
                debug!(
                    "Loaded {} submission(s) for current user, {} total",
                    submissions.len(),
                    total
                );
                self.history = History {
                    submissions,
                    total,
                    error: None,
                };
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to load submissions: {}", e);
                self.history.error = Some(MSG_HISTORY_FAILED.to_string());
            }
        }
    }

    // ── Form-data panel ───────────────────────────────────────────────────

    /// Open or close the panel; opening shows the most recent submission.
    pub fn toggle_panel(&mut self) -> bool {
        let open = !self.panel_open;
        if open {
            self.last_submission = self.history.submissions.first().cloned();
        }
        self.set_panel(open);
        open
    }

    fn set_panel(&mut self, open: bool) {
        self.panel_open = open;
        self.prefs.set_panel_open(open);
    }

    // ── Preview / export ──────────────────────────────────────────────────

    pub async fn preview(&self, submission: &Submission) -> Result<Preview, IntakeError> {
        let renderer = self.renderer.as_ref().ok_or_else(|| IntakeError::PreviewFailed {
            detail: "no snapshot renderer configured".into(),
        })?;
        export::render_preview(renderer.as_ref(), submission, self.config.jpeg_quality).await
    }

    pub async fn export(&self, preview: &Preview) -> Result<ExportedDocument, IntakeError> {
        export::export_document(preview, self.config.page, self.config.jpeg_quality).await
    }

    // ── Auth ──────────────────────────────────────────────────────────────

    pub async fn sign_out(&mut self) -> Result<(), IntakeError> {
        self.auth.sign_out().await.map_err(|e| {
            warn!("Sign-out failed: {}", e);
            IntakeError::RemoteOperationFailed {
                operation: "sign out",
                message: e.to_string(),
            }
        })?;
        self.go_home();
        self.history = History::default();
        self.last_submission = None;
        info!("Signed out");
        Ok(())
    }
}

impl Drop for FormSession {
    fn drop(&mut self) {
        self.gate.cancel_handle().cancel();
    }
}
