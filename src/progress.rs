//! Progress-callback trait for per-file upload events.
//!
//! Inject an [`Arc<dyn UploadProgressCallback>`] via
//! [`crate::config::IntakeConfigBuilder::progress_callback`] to receive
//! events as the [`crate::upload::UploadTracker`] moves each file along.
//! Transfers run concurrently, so events for different files interleave in
//! any order.
//!
//! # Example
//!
//! ```rust
//! use intake_form::{IntakeConfig, UploadProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl UploadProgressCallback for CountingCallback {
//!     fn on_upload_complete(&self, id: &str, url: &str) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id} -> {url}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//!
//! let config = IntakeConfig::builder()
//!     .progress_callback(cb as Arc<dyn UploadProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the upload tracker as files move through their lifecycle.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must protect shared mutable state
/// with synchronisation primitives; calls arrive from transfer tasks.
pub trait UploadProgressCallback: Send + Sync {
    /// A record was created and its transfer started.
    ///
    /// # Arguments
    /// * `id`: record identifier
    /// * `name`: original file name
    /// * `size`: byte size
    fn on_upload_start(&self, id: &str, name: &str, size: u64) {
        let _ = (id, name, size);
    }

    /// The record's progress moved forward.
    fn on_upload_progress(&self, id: &str, percent: u8) {
        let _ = (id, percent);
    }

    /// The transfer finished and the record resolved to `url`.
    fn on_upload_complete(&self, id: &str, url: &str) {
        let _ = (id, url);
    }

    /// The record entered its error state (size rejection or transfer failure).
    fn on_upload_error(&self, id: &str, error: &str) {
        let _ = (id, error);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl UploadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IntakeConfig`].
pub type ProgressCallback = Arc<dyn UploadProgressCallback>;
