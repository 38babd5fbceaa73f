//! Concurrent file transfers feeding the [`UploadSet`].
//!
//! Each accepted file gets its own tokio task. Progress, success and failure
//! events are applied to the shared set as one read-modify-write each,
//! through [`tokio::sync::watch::Sender::send_if_modified`], so events for
//! different records never clobber each other and subscribers (the step
//! gate) wake on every change.

use crate::config::IntakeConfig;
use crate::error::UploadError;
use crate::model::{SelectedFile, UploadRecord};
use crate::ports::{BlobStorage, TransferProgress};
use crate::progress::ProgressCallback;
use crate::upload::UploadSet;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Owns the upload records of one form and the transfers behind them.
///
/// Cheap to clone; clones share the same state. Must be used from within a
/// tokio runtime because [`select`](Self::select) spawns transfer tasks.
#[derive(Clone)]
pub struct UploadTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    state: watch::Sender<UploadSet>,
    storage: Arc<dyn BlobStorage>,
    max_upload_bytes: u64,
    storage_prefix: String,
    cancel_on_remove: bool,
    callback: ProgressCallback,
    tasks: Mutex<HashMap<String, AbortHandle>>,
    last_stamp: AtomicI64,
}

impl UploadTracker {
    pub fn new(storage: Arc<dyn BlobStorage>, config: &IntakeConfig) -> Self {
        let (state, _) = watch::channel(UploadSet::default());
        Self {
            inner: Arc::new(TrackerInner {
                state,
                storage,
                max_upload_bytes: config.max_upload_bytes,
                storage_prefix: config.storage_prefix.clone(),
                cancel_on_remove: config.cancel_on_remove,
                callback: Arc::clone(&config.progress_callback),
                tasks: Mutex::new(HashMap::new()),
                last_stamp: AtomicI64::new(0),
            }),
        }
    }

    /// Track a batch of picked files and start their transfers.
    ///
    /// Files whose name and size match an already tracked record (or an
    /// earlier file of the same batch) are dropped silently. Oversized files
    /// get a record in the [`UploadError::TooLarge`] state and no transfer.
    /// Returns the ids of the records created.
    pub fn select(&self, files: Vec<SelectedFile>) -> Vec<String> {
        let inner = &self.inner;
        let mut created = Vec::new();
        let mut seen: HashSet<(String, u64)> = HashSet::new();

        for (idx, file) in files.into_iter().enumerate() {
            let size = file.size();
            if !seen.insert((file.name.clone(), size))
                || inner.state.borrow().contains_file(&file.name, size)
            {
                debug!("Ignoring duplicate selection of '{}' ({} bytes)", file.name, size);
                continue;
            }

            let stamp = inner.next_stamp();
            let id = format!("{}_{}_{}", stamp, idx, file.name);
            let mut record = UploadRecord::new(id.clone(), file.name.clone(), size);

            if size > inner.max_upload_bytes {
                let error = UploadError::TooLarge {
                    size,
                    limit: inner.max_upload_bytes,
                };
                warn!("Rejected '{}': {} bytes exceeds the upload limit", file.name, size);
                inner.callback.on_upload_error(&id, &error.to_string());
                record.error = Some(error);
                inner.state.send_modify(|s| s.insert(record));
                created.push(id);
                continue;
            }

            record.in_flight = true;
            inner.state.send_modify(|s| s.insert(record));
            inner.callback.on_upload_start(&id, &file.name, size);

            let path = format!("{}/{}_{}", inner.storage_prefix, stamp, file.name);
            info!("Uploading '{}' ({} bytes) to {}", file.name, size, path);

            // The task deregisters itself under the same lock, so its entry
            // cannot be removed before it is inserted.
            let mut tasks = inner.lock_tasks();
            let handle = tokio::spawn(run_transfer(
                Arc::clone(inner),
                id.clone(),
                path,
                file.bytes,
            ));
            tasks.insert(id.clone(), handle.abort_handle());
            drop(tasks);

            created.push(id);
        }
        created
    }

    /// Stop tracking a record. Its resolved URL, if any, leaves the CV list.
    ///
    /// An in-flight transfer is detached (its outcome is ignored) unless the
    /// tracker was configured with `cancel_on_remove`, in which case the
    /// transfer task is aborted.
    pub fn remove_upload(&self, id: &str) -> Option<UploadRecord> {
        let mut removed = None;
        self.inner.state.send_if_modified(|s| {
            removed = s.remove(id);
            removed.is_some()
        });
        let record = removed?;

        if let Some(handle) = self.inner.lock_tasks().remove(id) {
            if self.inner.cancel_on_remove {
                debug!("Aborting transfer of removed record {}", id);
                handle.abort();
            } else {
                debug!("Detaching transfer of removed record {}", id);
            }
        }
        info!("Removed upload '{}'", record.name);
        Some(record)
    }

    /// A copy of the current records and CV URLs.
    pub fn snapshot(&self) -> UploadSet {
        self.inner.state.borrow().clone()
    }

    pub fn cv_urls(&self) -> Vec<String> {
        self.inner.state.borrow().cv_urls().to_vec()
    }

    /// Change notifications; the receiver always sees the latest set.
    pub fn subscribe(&self) -> watch::Receiver<UploadSet> {
        self.inner.state.subscribe()
    }

    /// Stream of upload sets: the current one first, then one per change.
    /// Intermediate states may be skipped when the consumer lags.
    pub fn changes(&self) -> WatchStream<UploadSet> {
        WatchStream::new(self.subscribe())
    }

    /// Resolves once no record has a transfer attached.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| !s.any_in_flight()).await;
    }

    /// Replace the tracked state with records restored from a draft.
    pub fn restore(&self, records: Vec<UploadRecord>, cv_urls: Vec<String>) {
        self.detach_all();
        let set = UploadSet::restore(records, cv_urls);
        debug!("Restored {} upload record(s) from draft", set.len());
        self.inner.state.send_replace(set);
    }

    /// Forget every record, e.g. after a successful submission.
    pub fn clear(&self) {
        self.detach_all();
        self.inner.state.send_modify(UploadSet::clear);
    }

    fn detach_all(&self) {
        let tasks: Vec<AbortHandle> = self.inner.lock_tasks().drain().map(|(_, h)| h).collect();
        if self.inner.cancel_on_remove {
            tasks.iter().for_each(AbortHandle::abort);
        }
    }

    #[cfg(test)]
    pub(crate) fn update(&self, f: impl FnOnce(&mut UploadSet)) {
        self.inner.state.send_modify(f);
    }
}

impl TrackerInner {
    /// Millisecond timestamp, bumped when two selections land in the same
    /// millisecond so ids and storage paths stay unique.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<String, AbortHandle>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_progress(&self, id: &str, percent: u8) {
        let mut applied = None;
        self.state.send_if_modified(|s| {
            if s.apply_progress(id, percent) {
                applied = s.get(id).map(|r| r.progress);
                true
            } else {
                false
            }
        });
        if let Some(p) = applied {
            debug!("Upload {} at {}%", id, p);
            self.callback.on_upload_progress(id, p);
        }
    }

    fn on_success(&self, id: &str, url: String) {
        let resolved = self
            .state
            .send_if_modified(|s| s.resolve_upload(id, url.clone()));
        if resolved {
            info!("Upload {} complete: {}", id, url);
            self.callback.on_upload_complete(id, &url);
        } else {
            debug!("Ignoring completion of untracked upload {}", id);
        }
    }

    fn on_failure(&self, id: &str, error: UploadError) {
        let message = error.to_string();
        let failed = self.state.send_if_modified(|s| s.fail_upload(id, error));
        if failed {
            self.callback.on_upload_error(id, &message);
        }
    }
}

async fn run_transfer(inner: Arc<TrackerInner>, id: String, path: String, bytes: Bytes) {
    let sink = Arc::clone(&inner);
    let sink_id = id.clone();
    let on_progress: TransferProgress = Arc::new(move |pct| sink.on_progress(&sink_id, pct));

    match inner.storage.upload(bytes, &path, on_progress).await {
        Ok(url) => inner.on_success(&id, url),
        Err(e) => {
            warn!("Upload {} failed: {}", id, e);
            inner.on_failure(&id, UploadError::TransferFailed { detail: e.to_string() });
        }
    }
    inner.lock_tasks().remove(&id);
}
