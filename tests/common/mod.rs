//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, Rgb, RgbImage};
use intake_form::adapters::{MemoryKeyValueStore, MemorySubmissionStore, StaticAuth};
use intake_form::ports::{
    BlobStorage, KeyValueStore, PortError, PortResult, SnapshotRenderer, TransferProgress,
};
use intake_form::{Collaborators, FieldName, FormSession, IntakeConfig, Submission};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

// ── Storage ──────────────────────────────────────────────────────────────────

/// How a pending transfer should end.
pub enum Release {
    Succeed,
    Fail(String),
}

/// Blob storage whose transfers report 40 % and then park until the test
/// releases them by path. Transfers that are never released stay parked.
#[derive(Default)]
pub struct ControlledStorage {
    pending: Mutex<HashMap<String, oneshot::Sender<Release>>>,
    silent: bool,
}

impl ControlledStorage {
    /// Like the default, but transfers report no progress before release,
    /// so their records stay at 0 %.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Paths with a parked transfer, sorted.
    pub fn pending(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.pending.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// End every parked transfer the same way. Returns how many were released.
    pub fn release_all(&self, how: impl Fn() -> Release) -> usize {
        let senders: Vec<_> = self.pending.lock().unwrap().drain().collect();
        let n = senders.len();
        for (_, tx) in senders {
            let _ = tx.send(how());
        }
        n
    }
}

#[async_trait]
impl BlobStorage for ControlledStorage {
    async fn upload(
        &self,
        _bytes: Bytes,
        path: &str,
        on_progress: TransferProgress,
    ) -> PortResult<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(path.to_string(), tx);
        if !self.silent {
            on_progress(40);
        }

        match rx.await {
            Ok(Release::Succeed) => {
                on_progress(100);
                Ok(format!("https://cdn.test/{path}"))
            }
            Ok(Release::Fail(reason)) => Err(PortError::Unavailable(reason)),
            Err(_) => Err(PortError::Unexpected("transfer dropped".into())),
        }
    }
}

// ── Renderer ─────────────────────────────────────────────────────────────────

/// Renders every submission as a striped `width` x `height` image.
pub struct StripedRenderer {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
impl SnapshotRenderer for StripedRenderer {
    async fn render(&self, _submission: &Submission) -> PortResult<DynamicImage> {
        let img = RgbImage::from_fn(self.width, self.height, |_, y| {
            if (y / 50) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([30, 60, 90])
            }
        });
        Ok(DynamicImage::ImageRgb8(img))
    }
}

// ── Session harness ──────────────────────────────────────────────────────────

/// A session plus handles to the fakes behind it.
pub struct Harness {
    pub session: FormSession,
    pub store: Arc<MemorySubmissionStore>,
    pub storage: Arc<dyn BlobStorage>,
    pub kv: Arc<dyn KeyValueStore>,
}

pub struct HarnessBuilder {
    config: IntakeConfig,
    store: Arc<MemorySubmissionStore>,
    storage: Arc<dyn BlobStorage>,
    kv: Arc<dyn KeyValueStore>,
    auth: Arc<StaticAuth>,
    renderer: Option<StripedRenderer>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: IntakeConfig::default(),
            store: Arc::new(MemorySubmissionStore::default()),
            storage: Arc::new(intake_form::adapters::MemoryBlobStorage::default()),
            kv: Arc::new(MemoryKeyValueStore::default()),
            auth: Arc::new(StaticAuth::signed_in("user-ana", "ana@example.com")),
            renderer: None,
        }
    }
}

impl HarnessBuilder {
    pub fn config(mut self, config: IntakeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<MemorySubmissionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn BlobStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn kv(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = kv;
        self
    }

    pub fn auth(mut self, auth: StaticAuth) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn renderer(mut self, width: u32, height: u32) -> Self {
        self.renderer = Some(StripedRenderer { width, height });
        self
    }

    pub fn build(self) -> Harness {
        init_tracing();
        let session = FormSession::new(
            self.config,
            Collaborators {
                store: self.store.clone(),
                storage: Arc::clone(&self.storage),
                auth: self.auth,
                kv: Arc::clone(&self.kv),
                renderer: self
                    .renderer
                    .map(|r| Arc::new(r) as Arc<dyn SnapshotRenderer>),
            },
        );
        Harness {
            session,
            store: self.store,
            storage: self.storage,
            kv: self.kv,
        }
    }
}

/// Send library logs to the test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Type in the valid personal info of Ana Li, blurring each field.
pub fn fill_valid(session: &mut FormSession) {
    for (field, value) in [
        (FieldName::FirstName, "Ana"),
        (FieldName::LastName, "Li"),
        (FieldName::Phone, "+1 555 123 4567"),
    ] {
        session.set_field(field, value);
        session.blur(field);
    }
    session.set_dob_day(Some(2));
    session.set_dob_month(Some(5));
    session.set_dob_year(Some(1990));
}

/// Wait until `pred` holds for the tracker's upload set.
pub async fn wait_uploads(
    session: &FormSession,
    pred: impl FnMut(&intake_form::UploadSet) -> bool,
) {
    let mut rx = session.tracker().subscribe();
    rx.wait_for(pred).await.expect("tracker dropped");
}
