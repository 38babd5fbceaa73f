//! Draft persistence for the personal-info step.
//!
//! The draft is a JSON blob under a fixed key of the injected
//! [`KeyValueStore`]. All persistence here is best effort: read and write
//! failures are logged and treated as "no draft", never surfaced to the user.

use crate::model::{Draft, FormData};
use crate::ports::KeyValueStore;
use crate::upload::UploadSet;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Key of the personal-info draft.
pub const DRAFT_KEY: &str = "personalInfoDraft";

/// Key of the "form-data panel open" preference.
pub const PANEL_KEY: &str = "isFormDataOpen";

/// Build a draft from the live form and upload state.
///
/// Records carry only display metadata; the file bytes never leave the
/// transfer task, so nothing needs stripping beyond what serde skips.
pub fn snapshot(form: &FormData, uploads: &UploadSet) -> Draft {
    Draft {
        form: form.clone(),
        cv_urls: uploads.cv_urls().to_vec(),
        uploaded_files: uploads.records().to_vec(),
    }
}

/// Reads and writes the draft blob.
#[derive(Clone)]
pub struct DraftStore {
    kv: Arc<dyn KeyValueStore>,
}

impl DraftStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, draft: &Draft) {
        let json = match serde_json::to_string(draft) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialise draft: {}", e);
                return;
            }
        };
        if let Err(e) = self.kv.set(DRAFT_KEY, &json) {
            warn!("Failed to save draft: {}", e);
        }
    }

    /// The saved draft, or `None` when absent, unreadable or malformed.
    pub fn load(&self) -> Option<Draft> {
        let raw = match self.kv.get(DRAFT_KEY) {
            Ok(v) => v?,
            Err(e) => {
                warn!("Failed to read draft: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Ignoring malformed draft: {}", e);
                None
            }
        }
    }

    pub fn exists(&self) -> bool {
        matches!(self.kv.get(DRAFT_KEY), Ok(Some(_)))
    }

    pub fn clear(&self) {
        if let Err(e) = self.kv.remove(DRAFT_KEY) {
            warn!("Failed to delete draft: {}", e);
        }
    }
}

/// Persisted UI preferences.
#[derive(Clone)]
pub struct UiPreferences {
    kv: Arc<dyn KeyValueStore>,
}

impl UiPreferences {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn panel_open(&self) -> bool {
        match self.kv.get(PANEL_KEY) {
            Ok(Some(v)) => serde_json::from_str(&v).unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read panel preference: {}", e);
                false
            }
        }
    }

    pub fn set_panel_open(&self, open: bool) {
        if let Err(e) = self.kv.set(PANEL_KEY, if open { "true" } else { "false" }) {
            warn!("Failed to save panel preference: {}", e);
        }
    }
}

// ── Autosave ─────────────────────────────────────────────────────────────

/// Periodic draft snapshots while the personal-info step is active.
///
/// The timer task is aborted by [`stop`](Self::stop) or on drop, so a torn
/// down step never writes again.
pub struct Autosaver {
    task: JoinHandle<()>,
    last_saved: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl Autosaver {
    /// Save `source()` every `period`, first after one full period.
    pub fn spawn<F>(period: Duration, store: DraftStore, source: F) -> Self
    where
        F: Fn() -> Draft + Send + Sync + 'static,
    {
        let last_saved = Arc::new(Mutex::new(None));
        let stamp = Arc::clone(&last_saved);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.save(&source());
                let now = Utc::now();
                *stamp.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
                debug!("Draft autosaved at {}", now.format("%H:%M:%S"));
            }
        });
        Self { task, last_saved }
    }

    /// Wall-clock time of the most recent snapshot.
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        *self.last_saved.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.task.abort();
    }
}
