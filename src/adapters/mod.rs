//! Concrete collaborators.

pub mod file_store;
pub mod http_storage;
pub mod memory;

pub use file_store::FileKeyValueStore;
pub use http_storage::HttpBlobStorage;
pub use memory::{MemoryBlobStorage, MemoryKeyValueStore, MemorySubmissionStore, StaticAuth};
