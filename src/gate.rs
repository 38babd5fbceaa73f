//! The step gate: may the wizard leave the personal-info step?
//!
//! ```text
//!  Idle ──continue──▶ ValidatingAll ──errors──▶ Blocked(InvalidFields)
//!                          │
//!                          ├── nothing mid-progress ──▶ Advance
//!                          ▼
//!                  WaitingForUploads ──error──▶ Blocked(UploadFailed)
//!                          │        ──deadline──▶ Blocked(UploadTimeout)
//!                          ▼
//!                       Advance
//! ```
//!
//! While waiting the gate subscribes to the tracker's change channel instead
//! of polling, and the wait can be cancelled from a [`GateCancel`] handle
//! when the step is torn down.

use crate::error::IntakeError;
use crate::model::{FieldName, FormData};
use crate::upload::{UploadSet, UploadTracker};
use crate::validate::{validate_all, FieldFeedback, MSG_CV_FAILED, MSG_CV_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Observable state of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Idle,
    ValidatingAll,
    /// `progress` is the mean progress of all tracked records.
    WaitingForUploads { progress: u8 },
    Blocked(GateBlock),
    Advance,
}

impl GateState {
    /// Whether the continue action is enabled.
    pub fn accepts_continue(&self) -> bool {
        !matches!(
            self,
            GateState::ValidatingAll | GateState::WaitingForUploads { .. }
        )
    }
}

/// Why the gate refused to advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateBlock {
    /// Field errors in focus order; `focus` is the first of them.
    InvalidFields {
        focus: FieldName,
        errors: Vec<(FieldName, String)>,
    },
    UploadFailed,
    UploadTimeout { secs: u64 },
}

impl GateBlock {
    /// Message shown to the user.
    pub fn message(&self) -> &str {
        match self {
            GateBlock::InvalidFields { errors, .. } => {
                errors.first().map(|(_, m)| m.as_str()).unwrap_or_default()
            }
            GateBlock::UploadFailed => MSG_CV_FAILED,
            GateBlock::UploadTimeout { .. } => MSG_CV_TIMEOUT,
        }
    }

    pub fn to_error(&self) -> IntakeError {
        match self {
            GateBlock::InvalidFields { focus, .. } => IntakeError::Validation {
                field: *focus,
                message: self.message().to_string(),
            },
            GateBlock::UploadFailed => IntakeError::RemoteOperationFailed {
                operation: "upload",
                message: MSG_CV_FAILED.to_string(),
            },
            GateBlock::UploadTimeout { secs } => IntakeError::UploadTimeout { secs: *secs },
        }
    }
}

/// Result of one continue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Advance,
    Blocked(GateBlock),
    /// The wait was abandoned through [`GateCancel`].
    Cancelled,
}

/// Cancels a pending wait of the gate it came from.
#[derive(Debug, Clone)]
pub struct GateCancel(Arc<Notify>);

impl GateCancel {
    pub fn cancel(&self) {
        self.0.notify_waiters();
    }
}

#[derive(Debug)]
pub struct StepGate {
    state: watch::Sender<GateState>,
    cancel: Arc<Notify>,
    timeout: Duration,
}

impl StepGate {
    pub fn new(timeout: Duration) -> Self {
        let (state, _) = watch::channel(GateState::Idle);
        Self {
            state,
            cancel: Arc::new(Notify::new()),
            timeout,
        }
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    pub fn cancel_handle(&self) -> GateCancel {
        GateCancel(Arc::clone(&self.cancel))
    }

    /// Back to `Idle`, e.g. when the next step starts.
    pub fn reset(&self) {
        self.state.send_replace(GateState::Idle);
    }

    /// Run one continue attempt.
    ///
    /// Validates every field (marking all of them touched), then waits for
    /// in-flight uploads if needed. Upload-related blocks are also written to
    /// the CV field's feedback.
    pub async fn request_continue(
        &self,
        form: &FormData,
        tracker: &UploadTracker,
        feedback: &mut FieldFeedback,
    ) -> GateOutcome {
        self.state.send_replace(GateState::ValidatingAll);

        let uploads = tracker.snapshot();
        let results = validate_all(form, &uploads);
        feedback.apply_full_pass(&results);

        // Mid-progress uploads produce a CV error of their own; that one is
        // resolved by waiting, every other error blocks right away.
        let blocking: Vec<(FieldName, String)> = results
            .iter()
            .filter(|(f, _)| !(*f == FieldName::Cv && only_waiting(&uploads)))
            .map(|(f, m)| (*f, (*m).to_string()))
            .collect();

        if let Some((focus, _)) = blocking.first() {
            let block = GateBlock::InvalidFields {
                focus: *focus,
                errors: blocking.clone(),
            };
            info!("Continue blocked: {} invalid field(s), focus {}", blocking.len(), focus);
            return self.finish(GateOutcome::Blocked(block));
        }

        let outcome = if uploads.any_mid_progress() {
            self.wait_for_uploads(tracker).await
        } else {
            GateOutcome::Advance
        };

        match &outcome {
            GateOutcome::Blocked(block) => {
                feedback.record(FieldName::Cv, Some(block.message()));
            }
            GateOutcome::Advance => {
                feedback.record(FieldName::Cv, None);
            }
            GateOutcome::Cancelled => {}
        }
        self.finish(outcome)
    }

    /// Wait until no record is mid-progress, any record fails, the deadline
    /// passes or the wait is cancelled.
    pub async fn wait_for_uploads(&self, tracker: &UploadTracker) -> GateOutcome {
        let deadline = Instant::now() + self.timeout;
        let mut rx = tracker.subscribe();
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        debug!("Waiting up to {:?} for uploads", self.timeout);

        let outcome = loop {
            let verdict = {
                let set = rx.borrow_and_update();
                self.evaluate(&set)
            };
            if let Some(outcome) = verdict {
                break outcome;
            }

            tokio::select! {
                _ = &mut cancelled => {
                    debug!("Upload wait cancelled");
                    self.state.send_replace(GateState::Idle);
                    return GateOutcome::Cancelled;
                }
                changed = timeout_at(deadline, rx.changed()) => match changed {
                    Ok(Ok(())) => continue,
                    Ok(Err(_)) => {
                        tokio::time::sleep_until(deadline).await;
                        break self.timed_out();
                    }
                    Err(_) => break self.timed_out(),
                },
            }
        };
        self.finish(outcome)
    }

    fn evaluate(&self, set: &UploadSet) -> Option<GateOutcome> {
        if set.has_errors() {
            warn!("Upload failed while waiting to continue");
            return Some(GateOutcome::Blocked(GateBlock::UploadFailed));
        }
        if !set.any_mid_progress() {
            return Some(GateOutcome::Advance);
        }
        let progress = set.aggregate_progress();
        self.state
            .send_if_modified(|s| match s {
                GateState::WaitingForUploads { progress: p } if *p == progress => false,
                _ => {
                    *s = GateState::WaitingForUploads { progress };
                    true
                }
            });
        None
    }

    fn timed_out(&self) -> GateOutcome {
        warn!("Uploads still in progress after {:?}", self.timeout);
        GateOutcome::Blocked(GateBlock::UploadTimeout {
            secs: self.timeout.as_secs(),
        })
    }

    fn finish(&self, outcome: GateOutcome) -> GateOutcome {
        let next = match &outcome {
            GateOutcome::Advance => GateState::Advance,
            GateOutcome::Blocked(b) => GateState::Blocked(b.clone()),
            GateOutcome::Cancelled => GateState::Idle,
        };
        self.state.send_replace(next);
        outcome
    }
}

/// The only upload problem is records still moving.
fn only_waiting(uploads: &UploadSet) -> bool {
    uploads.any_mid_progress() && !uploads.has_errors()
}
