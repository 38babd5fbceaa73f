//! # intake-form
//!
//! The engine behind a multi-step personal-information intake form: field
//! validation, concurrent CV uploads with per-file progress, a step gate
//! that waits (bounded) for in-flight uploads, local draft persistence, and
//! export of a past submission as a paginated image-based PDF.
//!
//! Remote persistence, blob storage, authentication, local key/value storage
//! and snapshot rendering are injected through the traits in [`ports`];
//! [`adapters`] ships in-memory, file and HTTP implementations.
//!
//! ## Flow
//!
//! ```text
//! Landing
//!  │ start()                    draft restored, autosave every 30 s
//!  ▼
//! PersonalInfo ── set_field / blur / select_files ──▶ validate + upload tracker
//!  │ continue_personal()        step gate: validate all, wait for uploads ≤ 30 s
//!  ▼
//! Email ── submit() ──▶ SubmissionStore::create, history reload
//!  ▼
//! Done ── go_home() / start_new_form()
//!
//! preview(submission) → export(preview) → submission_{id}.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use intake_form::adapters::{MemoryBlobStorage, MemoryKeyValueStore, MemorySubmissionStore, StaticAuth};
//! use intake_form::{Collaborators, FieldName, FormSession, GateOutcome, IntakeConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = FormSession::new(
//!         IntakeConfig::default(),
//!         Collaborators {
//!             store: Arc::new(MemorySubmissionStore::default()),
//!             storage: Arc::new(MemoryBlobStorage::default()),
//!             auth: Arc::new(StaticAuth::signed_in("u1", "ana@example.com")),
//!             kv: Arc::new(MemoryKeyValueStore::default()),
//!             renderer: None,
//!         },
//!     );
//!     session.start();
//!     session.set_field(FieldName::FirstName, "Ana");
//!     session.set_field(FieldName::LastName, "Li");
//!     session.set_field(FieldName::Phone, "+1 555 123 4567");
//!     session.set_dob_day(Some(2));
//!     session.set_dob_month(Some(5));
//!     session.set_dob_year(Some(1990));
//!
//!     if session.continue_personal().await? == GateOutcome::Advance {
//!         let id = session.submit().await?;
//!         println!("submitted {id}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `intake` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod adapters;
pub mod config;
pub mod draft;
pub mod error;
pub mod export;
pub mod gate;
pub mod model;
pub mod ports;
pub mod progress;
pub mod session;
pub mod upload;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IntakeConfig, IntakeConfigBuilder, PageGeometry};
pub use error::{IntakeError, UploadError};
pub use export::{export_image, write_atomic, ExportedDocument, Preview};
pub use gate::{GateBlock, GateCancel, GateOutcome, GateState, StepGate};
pub use model::{
    document_filename, format_bytes, DobParts, Draft, FieldName, FormData, NewSubmission, PreferredLanguage,
    SelectedFile, Submission, UploadRecord,
};
pub use ports::{PortError, PortResult};
pub use progress::{NoopProgressCallback, ProgressCallback, UploadProgressCallback};
pub use session::{Collaborators, FormSession, History, Step};
pub use upload::{UploadSet, UploadTracker};
pub use validate::{validate, validate_all, validate_email, FieldFeedback};
