//! Payload storage backends
//!
//! A document's bytes live either inline next to its metadata row or in one
//! external backend, keyed by the document id. External backends implement
//! [`StorageBackend`] and are looked up by id through the [`BackendRegistry`].

pub mod disk;
pub mod memory;
pub mod registry;
pub mod s3;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;
pub use registry::{BackendFactory, BackendRegistry, BackendRegistryBuilder, Placement};
pub use s3::{S3Backend, S3Config};

use crate::error::DocResult;
use async_trait::async_trait;

/// Reserved backend id for payloads stored in the metadata row itself
pub const INLINE_BACKEND_ID: &str = "local-sql";

/// Storage backend trait
///
/// Implementations handle the actual storage and retrieval of payload bytes.
/// They never cache; the document record does.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short adapter label used in logs and metrics
    fn kind(&self) -> &'static str;

    /// Read the bytes stored under `key`, failing with `NotFound` when absent
    async fn read(&self, key: &str) -> DocResult<Vec<u8>>;

    /// Store bytes under `key`, replacing any previous value
    async fn write(&self, key: &str, data: &[u8]) -> DocResult<()>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> DocResult<()>;
}
