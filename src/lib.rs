//! docvault - document storage with metadata in SQLite and payloads on
//! pluggable backends (inline column, local disk, S3, memory).

pub mod backend;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod metrics;

pub use backend::{BackendRegistry, StorageBackend, INLINE_BACKEND_ID};
pub use config::VaultConfig;
pub use document::{DocumentRecord, DocumentStore, MoveOutcome, Upload};
pub use error::{DocError, DocResult};
