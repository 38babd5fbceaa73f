//! Error types for the intake-form library.
//!
//! Two error types reflect two failure scopes:
//!
//! * [`IntakeError`]: aborts a single user action (continue, submit,
//!   preview, export). Nothing here is fatal to the process: the caller
//!   surfaces the message and the user retries.
//!
//! * [`UploadError`]: a single file failed. Stored on the
//!   [`crate::model::UploadRecord`] it belongs to and folded into the CV
//!   field's validation message; the other files keep transferring.

use crate::model::FieldName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort one action of the intake flow.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── User input ────────────────────────────────────────────────────────
    /// A field failed validation; `message` is the inline text shown to the user.
    #[error("{field}: {message}")]
    Validation { field: FieldName, message: String },

    /// In-flight uploads did not settle within the bounded wait.
    #[error("Upload timeout after {secs}s. Please try again.")]
    UploadTimeout { secs: u64 },

    // ── Collaborators ─────────────────────────────────────────────────────
    /// Persistence, storage or auth collaborator reported a failure.
    #[error("{operation} failed: {message}")]
    RemoteOperationFailed {
        operation: &'static str,
        message: String,
    },

    // ── Preview / export ──────────────────────────────────────────────────
    /// Rendering a submission to a snapshot image failed.
    #[error("Failed to generate preview: {detail}")]
    PreviewFailed { detail: String },

    /// Encoding pages or assembling the PDF failed.
    #[error("Failed to build PDF: {detail}")]
    ExportFailed { detail: String },

    /// The snapshot image has a zero dimension and cannot be paginated.
    #[error("Cannot paginate a {width}x{height} image")]
    InvalidImage { width: u32, height: u32 },

    /// Could not write the exported document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config / internal ─────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error (task panicked, runtime unavailable).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error attached to one upload record.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UploadError {
    /// Rejected at selection time; no transfer was started.
    #[error("File too large (max {} MB)", .limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },

    /// The storage collaborator rejected or dropped the transfer.
    #[error("Upload failed")]
    TransferFailed { detail: String },

    /// Restored from a draft before the transfer finished; the file must be
    /// selected again.
    #[error("Upload interrupted, please select the file again")]
    Interrupted,
}

impl UploadError {
    pub fn is_size_rejection(&self) -> bool {
        matches!(self, UploadError::TooLarge { .. })
    }
}
