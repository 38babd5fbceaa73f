//! In-process implementations of every port.
//!
//! Used by the tests, by the CLI's offline paths and by embedders that keep
//! state in memory. Failure injection lets callers exercise error paths.

use crate::model::{NewSubmission, Submission};
use crate::ports::{
    AuthProvider, BlobStorage, KeyValueStore, PortError, PortResult, SubmissionStore,
    TransferProgress,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

//=========================================================================================
// Submission store
//=========================================================================================

/// Submissions kept in a vector; identifiers are random UUIDs.
#[derive(Default)]
pub struct MemorySubmissionStore {
    rows: Mutex<Vec<Submission>>,
    unavailable: AtomicBool,
}

impl MemorySubmissionStore {
    /// Make every call fail with [`PortError::Unavailable`] while `down` is set.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Submission> {
        lock(&self.rows).clone()
    }

    fn check(&self) -> PortResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(PortError::Unavailable("submission store offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, submission: NewSubmission) -> PortResult<String> {
        self.check()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        lock(&self.rows).push(Submission {
            id: id.clone(),
            data: submission,
        });
        Ok(id)
    }

    async fn recent(&self, limit: usize) -> PortResult<Vec<Submission>> {
        self.check()?;
        let mut rows = lock(&self.rows).clone();
        // Stable sort keeps insertion order for equal timestamps; reverse
        // afterwards so the later insert comes first.
        rows.sort_by_key(|s| s.data.submitted_at);
        rows.reverse();
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count(&self) -> PortResult<u64> {
        self.check()?;
        Ok(lock(&self.rows).len() as u64)
    }
}

//=========================================================================================
// Blob storage
//=========================================================================================

/// Stores blobs in a map and reports progress in four steps.
pub struct MemoryBlobStorage {
    base_url: String,
    blobs: Mutex<HashMap<String, Bytes>>,
    fail_when: Mutex<Vec<String>>,
}

impl Default for MemoryBlobStorage {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl MemoryBlobStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: Mutex::new(HashMap::new()),
            fail_when: Mutex::new(Vec::new()),
        }
    }

    /// Reject uploads whose path contains `pattern`.
    pub fn fail_paths_containing(&self, pattern: impl Into<String>) {
        lock(&self.fail_when).push(pattern.into());
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        lock(&self.blobs).get(path).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn upload(
        &self,
        bytes: Bytes,
        path: &str,
        on_progress: TransferProgress,
    ) -> PortResult<String> {
        for pct in [25, 50, 75] {
            on_progress(pct);
            tokio::task::yield_now().await;
        }
        if lock(&self.fail_when).iter().any(|p| path.contains(p.as_str())) {
            return Err(PortError::Unavailable(format!("upload of {path} rejected")));
        }
        lock(&self.blobs).insert(path.to_string(), bytes);
        on_progress(100);
        Ok(format!("{}/{}", self.base_url, path))
    }
}

//=========================================================================================
// Key/value store
//=========================================================================================

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

//=========================================================================================
// Auth
//=========================================================================================

/// A fixed identity that can be signed out once.
#[derive(Debug, Default)]
pub struct StaticAuth {
    identity: Mutex<Option<(String, String)>>,
}

impl StaticAuth {
    pub fn signed_in(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            identity: Mutex::new(Some((user_id.into(), email.into()))),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    fn user_id(&self) -> Option<String> {
        lock(&self.identity).as_ref().map(|(id, _)| id.clone())
    }

    fn email(&self) -> Option<String> {
        lock(&self.identity).as_ref().map(|(_, email)| email.clone())
    }

    async fn sign_out(&self) -> PortResult<()> {
        lock(&self.identity).take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FormData;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn new_submission(offset_secs: i64) -> NewSubmission {
        FormData::default().to_submission(
            vec![],
            Some("u1".into()),
            Utc::now() + Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let store = MemorySubmissionStore::default();
        let old = store.create(new_submission(-10)).await.unwrap();
        let new = store.create(new_submission(0)).await.unwrap();
        assert_ne!(old, new);

        let recent = store.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, new);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_fails() {
        let store = MemorySubmissionStore::default();
        store.set_unavailable(true);
        assert!(matches!(
            store.create(new_submission(0)).await,
            Err(PortError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.count().await.is_ok());
    }

    #[tokio::test]
    async fn blob_storage_reports_progress_and_stores() {
        let storage = MemoryBlobStorage::new("https://cdn.test/");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let url = storage
            .upload(
                Bytes::from_static(b"cv"),
                "cvs/1_cv.pdf",
                Arc::new(move |p: u8| lock(&sink).push(p)),
            )
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/cvs/1_cv.pdf");
        assert_eq!(*lock(&seen), vec![25, 50, 75, 100]);
        assert_eq!(storage.get("cvs/1_cv.pdf").unwrap(), Bytes::from_static(b"cv"));
    }

    #[tokio::test]
    async fn blob_storage_failure_injection() {
        let storage = MemoryBlobStorage::default();
        storage.fail_paths_containing("broken");
        let err = storage
            .upload(Bytes::new(), "cvs/1_broken.pdf", Arc::new(|_: u8| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unavailable(_)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn auth_sign_out_clears_identity() {
        let auth = StaticAuth::signed_in("u1", "ana@example.com");
        assert_eq!(auth.user_id().as_deref(), Some("u1"));
        auth.sign_out().await.unwrap();
        assert_eq!(auth.user_id(), None);
        assert_eq!(auth.email(), None);
    }
}
