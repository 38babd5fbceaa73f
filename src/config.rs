//! Configuration for the intake flow.
//!
//! Every tunable of the upload tracker, step gate, draft autosave and
//! document export lives in [`IntakeConfig`], built via its
//! [`IntakeConfigBuilder`]. Defaults match what the hosted form ships with.

use crate::error::IntakeError;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by a [`crate::FormSession`] and its components.
///
/// # Example
/// ```rust
/// use intake_form::{IntakeConfig, PageGeometry};
///
/// let config = IntakeConfig::builder()
///     .max_upload_bytes(5 * 1024 * 1024)
///     .upload_wait_timeout_ms(10_000)
///     .page(PageGeometry::LETTER)
///     .build()
///     .unwrap();
/// assert_eq!(config.upload_wait_timeout().as_secs(), 10);
/// ```
#[derive(Clone)]
pub struct IntakeConfig {
    /// Per-file size ceiling in bytes. Larger files are rejected at
    /// selection time and never transferred. Default: 10 MiB.
    pub max_upload_bytes: u64,

    /// How long the step gate waits for in-flight uploads before giving up.
    /// Default: 30 000 ms.
    pub upload_wait_timeout_ms: u64,

    /// Draft snapshot interval while the personal-info step is active.
    /// Default: 30 s.
    pub autosave_interval_secs: u64,

    /// Leading path segment of uploaded files. Default: `"cvs"`.
    pub storage_prefix: String,

    /// How many recent submissions the history fetches. Default: 50.
    pub history_limit: usize,

    /// Target page of exported documents. Default: A4 portrait.
    pub page: PageGeometry,

    /// JPEG quality of preview and page images, 1–100. Default: 95.
    pub jpeg_quality: u8,

    /// Abort the transfer task when an in-flight upload is removed.
    /// Default: false (the transfer is detached and its result ignored).
    pub cancel_on_remove: bool,

    /// Receives per-file upload events.
    pub progress_callback: ProgressCallback,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            upload_wait_timeout_ms: 30_000,
            autosave_interval_secs: 30,
            storage_prefix: "cvs".to_string(),
            history_limit: 50,
            page: PageGeometry::A4,
            jpeg_quality: 95,
            cancel_on_remove: false,
            progress_callback: Arc::new(NoopProgressCallback),
        }
    }
}

impl fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("upload_wait_timeout_ms", &self.upload_wait_timeout_ms)
            .field("autosave_interval_secs", &self.autosave_interval_secs)
            .field("storage_prefix", &self.storage_prefix)
            .field("history_limit", &self.history_limit)
            .field("page", &self.page)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("cancel_on_remove", &self.cancel_on_remove)
            .field("progress_callback", &"<dyn UploadProgressCallback>")
            .finish()
    }
}

impl IntakeConfig {
    /// Create a new builder for `IntakeConfig`.
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn upload_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_wait_timeout_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn upload_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.config.upload_wait_timeout_ms = ms;
        self
    }

    pub fn autosave_interval_secs(mut self, secs: u64) -> Self {
        self.config.autosave_interval_secs = secs;
        self
    }

    pub fn storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.storage_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    pub fn history_limit(mut self, n: usize) -> Self {
        self.config.history_limit = n.max(1);
        self
    }

    pub fn page(mut self, page: PageGeometry) -> Self {
        self.config.page = page;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn cancel_on_remove(mut self, v: bool) -> Self {
        self.config.cancel_on_remove = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = cb;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(IntakeError::InvalidConfig(
                "Upload size limit must be ≥ 1 byte".into(),
            ));
        }
        if c.upload_wait_timeout_ms == 0 {
            return Err(IntakeError::InvalidConfig(
                "Upload wait timeout must be ≥ 1 ms".into(),
            ));
        }
        if c.autosave_interval_secs == 0 {
            return Err(IntakeError::InvalidConfig(
                "Autosave interval must be ≥ 1 s".into(),
            ));
        }
        if c.storage_prefix.is_empty() {
            return Err(IntakeError::InvalidConfig(
                "Storage prefix must not be empty".into(),
            ));
        }
        c.page.check()?;
        Ok(self.config)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Target page size of exported documents, in PDF points (1/72 in).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
}

impl PageGeometry {
    /// ISO A4 portrait.
    pub const A4: PageGeometry = PageGeometry {
        width: 595.28,
        height: 841.89,
    };

    /// US Letter portrait.
    pub const LETTER: PageGeometry = PageGeometry {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both sides must be finite and positive.
    pub fn check(&self) -> Result<(), IntakeError> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.width) && ok(self.height) {
            Ok(())
        } else {
            Err(IntakeError::InvalidConfig(format!(
                "Page size must be positive, got {}×{}",
                self.width, self.height
            )))
        }
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

impl FromStr for PageGeometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(Self::A4),
            "letter" => Ok(Self::LETTER),
            other => Err(format!("unknown page size '{other}' (expected a4 or letter)")),
        }
    }
}
