//! Documents: the record model and the store that persists it

pub mod record;
pub mod store;

pub use record::{DocumentInfo, DocumentRecord, Upload};
pub use store::{DocumentStore, IdSource, ListQuery, MigrationFailure, MigrationReport, MoveOutcome};
