//! The upload aggregate: tracked records plus the submission's CV URL list.
//!
//! Both slices change together. Every state transition of a record goes
//! through a method here, keyed by record id, and a transition that targets
//! an unknown id (a removed record whose transfer kept running) is a no-op.

use crate::error::UploadError;
use crate::model::UploadRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSet {
    records: Vec<UploadRecord>,
    cv_urls: Vec<String>,
}

impl UploadSet {
    /// Rebuild from persisted metadata. Records restored before reaching
    /// 100% have no file behind them any more and are marked interrupted.
    pub fn restore(records: Vec<UploadRecord>, cv_urls: Vec<String>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                r.in_flight = false;
                if !r.is_terminal() {
                    r.error = Some(UploadError::Interrupted);
                }
                r
            })
            .collect();
        Self { records, cv_urls }
    }

    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }

    pub fn cv_urls(&self) -> &[String] {
        &self.cv_urls
    }

    pub fn get(&self, id: &str) -> Option<&UploadRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Same name and byte size as a tracked record.
    pub fn contains_file(&self, name: &str, size: u64) -> bool {
        self.records.iter().any(|r| r.name == name && r.size == size)
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(|r| r.error.is_some())
    }

    pub fn any_mid_progress(&self) -> bool {
        self.records.iter().any(UploadRecord::is_mid_progress)
    }

    pub fn any_in_flight(&self) -> bool {
        self.records.iter().any(|r| r.in_flight)
    }

    /// Mean progress over all records, rounded; 0 when empty.
    pub fn aggregate_progress(&self) -> u8 {
        if self.records.is_empty() {
            return 0;
        }
        let sum: u32 = self.records.iter().map(|r| r.progress as u32).sum();
        let n = self.records.len() as u32;
        ((sum + n / 2) / n) as u8
    }

    pub(crate) fn insert(&mut self, record: UploadRecord) {
        self.records.push(record);
    }

    /// Move an active record forward. Values below the current progress are
    /// ignored and 100 is held back until the URL resolves.
    pub fn apply_progress(&mut self, id: &str, percent: u8) -> bool {
        let Some(r) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if r.is_terminal() {
            return false;
        }
        let next = percent.min(99);
        if next <= r.progress {
            return false;
        }
        r.progress = next;
        true
    }

    /// Terminal success: progress 100, URL set, URL appended to the CV list.
    pub fn resolve_upload(&mut self, id: &str, url: String) -> bool {
        let Some(r) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if r.is_terminal() {
            return false;
        }
        r.progress = 100;
        r.url = Some(url.clone());
        r.in_flight = false;
        self.cv_urls.push(url);
        true
    }

    /// Terminal failure. A record that already resolved keeps its URL.
    pub fn fail_upload(&mut self, id: &str, error: UploadError) -> bool {
        let Some(r) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if r.is_terminal() {
            return false;
        }
        r.error = Some(error);
        r.in_flight = false;
        true
    }

    /// Drop a record and, if it resolved, its URL from the CV list.
    pub fn remove(&mut self, id: &str) -> Option<UploadRecord> {
        let idx = self.records.iter().position(|r| r.id == id)?;
        let record = self.records.remove(idx);
        if let Some(url) = &record.url {
            self.cv_urls.retain(|u| u != url);
        }
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.cv_urls.clear();
    }
}
