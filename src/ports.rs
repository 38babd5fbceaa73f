//! Collaborator contracts: persistence, blob storage, auth, local key/value
//! storage and snapshot rendering.
//!
//! The core only talks to these traits. Concrete implementations live in
//! [`crate::adapters`]; tests substitute their own.

use crate::model::{NewSubmission, Submission};
use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use std::sync::Arc;

//=========================================================================================
// Port error and result types
//=========================================================================================

/// Failure reported by a collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Progress sink handed to [`BlobStorage::upload`]; receives 0–100.
pub type TransferProgress = Arc<dyn Fn(u8) + Send + Sync>;

//=========================================================================================
// Ports
//=========================================================================================

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persist a submission and return the identifier the store assigned.
    async fn create(&self, submission: NewSubmission) -> PortResult<String>;

    /// Most recent submissions first, at most `limit`.
    async fn recent(&self, limit: usize) -> PortResult<Vec<Submission>>;

    async fn count(&self) -> PortResult<u64>;
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Upload `bytes` to `path`, reporting progress as bytes move, and
    /// resolve to a publicly fetchable URL.
    async fn upload(&self, bytes: Bytes, path: &str, on_progress: TransferProgress)
        -> PortResult<String>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn user_id(&self) -> Option<String>;

    fn email(&self) -> Option<String>;

    async fn sign_out(&self) -> PortResult<()>;
}

/// Durable device-local key/value storage (string values).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PortResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PortResult<()>;

    fn remove(&self, key: &str) -> PortResult<()>;
}

#[async_trait]
pub trait SnapshotRenderer: Send + Sync {
    /// Render the printable layout of a submission into one tall image.
    async fn render(&self, submission: &Submission) -> PortResult<DynamicImage>;
}
