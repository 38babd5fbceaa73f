//! Upload tracking.
//!
//! - [`set`]: the [`UploadSet`] aggregate: records plus CV URLs, with every
//!   lifecycle transition keyed by record id
//! - [`tracker`]: [`UploadTracker`], which owns the set behind a watch
//!   channel and runs one transfer task per accepted file

pub mod set;
pub mod tracker;

pub use set::UploadSet;
pub use tracker::UploadTracker;
