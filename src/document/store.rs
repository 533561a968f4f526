//! Document store
//!
//! Sequences metadata writes in SQLite with payload I/O on the resolved
//! backend. A save writes the payload first and stores metadata in one short
//! statement afterwards, so backend latency never holds the database write
//! lock. Payload deletions that follow a committed change are best-effort.
//!
//! Two concurrent saves of the same record are not serialized here. Callers
//! that need that guarantee must serialize at a higher layer.
use crate::{
    backend::{BackendRegistry, Placement, StorageBackend, INLINE_BACKEND_ID},
    db::documents::{self, DocumentUpdate, InlineContents, NewDocument},
    document::{DocumentRecord, Upload},
    error::{DocError, DocResult},
    metrics,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Source of fresh document ids
pub type IdSource = Arc<dyn Fn() -> Uuid + Send + Sync>;

/// Result of [`DocumentStore::move_to`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The document already lived on the destination backend
    Unchanged,
    /// The payload now lives on the destination; `from` is the previous backend id
    Moved { from: String },
}

/// Filter for [`DocumentStore::list`]
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub backend_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            backend_id: None,
            limit: 100,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFailure {
    pub id: String,
    pub error: String,
}

/// Summary of a bulk backend migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub moved: Vec<String>,
    pub failed: Vec<MigrationFailure>,
}

/// Run a backend call and record its outcome and latency
async fn instrumented<T, F>(backend_id: &str, operation: &str, call: F) -> DocResult<T>
where
    F: Future<Output = DocResult<T>>,
{
    let started = Instant::now();
    let result = call.await;
    metrics::record_backend_operation(
        backend_id,
        operation,
        &result,
        started.elapsed().as_secs_f64(),
    );
    result
}

/// Main document store
#[derive(Clone)]
pub struct DocumentStore {
    db: SqlitePool,
    registry: Arc<BackendRegistry>,
    id_source: IdSource,
}

impl DocumentStore {
    pub fn new(db: SqlitePool, registry: Arc<BackendRegistry>) -> Self {
        Self {
            db,
            registry,
            id_source: Arc::new(Uuid::new_v4),
        }
    }

    /// Replace the random id source
    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// New, unsaved document on the default backend
    pub fn new_document(
        &self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        contents: Vec<u8>,
    ) -> DocResult<DocumentRecord> {
        let backend_id = self.registry.default_backend_id()?;
        Ok(DocumentRecord::new(name, mime_type, backend_id, contents))
    }

    /// New, unsaved document from an upload on the default backend
    pub fn document_from_upload(&self, upload: Upload) -> DocResult<DocumentRecord> {
        let backend_id = self.registry.default_backend_id()?;
        Ok(DocumentRecord::from_upload(upload, backend_id))
    }

    /// Persist a record: insert on first save, update afterwards
    pub async fn save(&self, record: &mut DocumentRecord) -> DocResult<()> {
        let operation = if record.is_new() { "insert" } else { "update" };
        let result = self.save_inner(record).await;
        metrics::record_document_operation(operation, &result);
        result
    }

    async fn save_inner(&self, record: &mut DocumentRecord) -> DocResult<()> {
        record.validate()?;

        let is_insert = record.is_new();
        if is_insert && !record.has_contents() {
            return Err(DocError::Validation(
                "contents are required for a new document".to_string(),
            ));
        }
        if !self.registry.is_known(record.backend_id()) {
            return Err(DocError::Config(format!(
                "unknown backend id: {}",
                record.backend_id()
            )));
        }

        let placement = self.registry.placement(record.backend_id()).await?;
        let backend_changed = record.backend_changed();
        let write_payload = is_insert || record.has_pending_contents() || backend_changed;
        if write_payload && !record.has_contents() {
            return Err(DocError::InvalidState(format!(
                "Contents of document {} must be loaded before changing its backend",
                record.id().unwrap_or("<new>")
            )));
        }
        let payload = if write_payload { record.contents() } else { None };

        let id = match record.id() {
            Some(id) => id.to_string(),
            None => self.generate_id().await?,
        };

        // Payload first, so no SQLite write lock is held during backend I/O
        let written = match (&placement, payload) {
            (Placement::External(backend), Some(bytes)) => {
                debug!(
                    "Writing {} bytes of document {} to backend '{}'",
                    bytes.len(),
                    id,
                    record.backend_id()
                );
                instrumented(record.backend_id(), "write", backend.write(&id, bytes)).await?;
                Some(Arc::clone(backend))
            }
            _ => None,
        };

        let now = Utc::now().timestamp();
        let stored = if is_insert {
            documents::insert(
                &self.db,
                &NewDocument {
                    id: &id,
                    name: record.name(),
                    mime_type: record.mime_type(),
                    backend_id: record.backend_id(),
                    local_contents: if placement.is_inline() { payload } else { None },
                    timestamp: now,
                },
            )
            .await
        } else {
            let contents = match (&placement, payload) {
                (Placement::Inline, Some(bytes)) => InlineContents::Set(bytes),
                (Placement::Inline, None) => InlineContents::Keep,
                (Placement::External(_), _) if backend_changed => InlineContents::Clear,
                (Placement::External(_), _) => InlineContents::Keep,
            };
            documents::update(
                &self.db,
                &DocumentUpdate {
                    id: &id,
                    name: record.name(),
                    mime_type: record.mime_type(),
                    backend_id: record.backend_id(),
                    contents,
                    updated_at: now,
                },
            )
            .await
            .and_then(|touched| match touched {
                0 => Err(DocError::NotFound(format!("Document not found: {}", id))),
                _ => Ok(()),
            })
        };

        if let Err(e) = stored {
            error!("Failed to store metadata of document {}: {}", id, e);
            // Bytes written under a key no row points at are removed again.
            // An in-place overwrite on the same backend cannot be undone.
            if is_insert || backend_changed {
                if let Some(backend) = written {
                    self.discard_orphan(record.backend_id(), &backend, &id).await;
                }
            }
            return Err(e);
        }

        info!(
            "{} document {} ({}, backend '{}')",
            if is_insert { "Created" } else { "Updated" },
            id,
            record.name(),
            record.backend_id()
        );
        record.mark_saved(id, now);

        Ok(())
    }

    /// Generate a fresh UUID, regenerating on the rare collision
    async fn generate_id(&self) -> DocResult<String> {
        loop {
            let id = (self.id_source)().to_string();
            if !documents::id_exists(&self.db, &id).await? {
                info!("Generating document id: {}", id);
                return Ok(id);
            }
            warn!("Document id {} already taken, regenerating", id);
        }
    }

    async fn discard_orphan(&self, backend_id: &str, backend: &Arc<dyn StorageBackend>, id: &str) {
        if let Err(e) = instrumented(backend_id, "delete", backend.delete(id)).await {
            error!(
                "Failed to remove payload of uncommitted document {} from backend '{}': {}",
                id, backend_id, e
            );
            metrics::record_cleanup_failure("save");
        }
    }

    /// Load metadata without the inline payload
    pub async fn find(&self, id: &str) -> DocResult<DocumentRecord> {
        documents::find(&self.db, id, false)
            .await?
            .map(DocumentRecord::from_row)
            .ok_or_else(|| DocError::NotFound(format!("Document not found: {}", id)))
    }

    /// Load metadata including the inline payload column
    pub async fn find_with_contents(&self, id: &str) -> DocResult<DocumentRecord> {
        documents::find(&self.db, id, true)
            .await?
            .map(DocumentRecord::from_row)
            .ok_or_else(|| DocError::NotFound(format!("Document not found: {}", id)))
    }

    pub async fn exists(&self, id: &str) -> DocResult<bool> {
        documents::id_exists(&self.db, id).await
    }

    /// Last modification time, for conditional downloads
    pub async fn last_modified(&self, id: &str) -> DocResult<i64> {
        documents::updated_at(&self.db, id)
            .await?
            .ok_or_else(|| DocError::NotFound(format!("Document not found: {}", id)))
    }

    /// List metadata, oldest first
    pub async fn list(&self, query: &ListQuery) -> DocResult<Vec<DocumentRecord>> {
        let rows = documents::list(
            &self.db,
            query.backend_id.as_deref(),
            i64::from(query.limit),
            i64::from(query.offset),
        )
        .await?;
        Ok(rows.into_iter().map(DocumentRecord::from_row).collect())
    }

    /// Number of documents per backend id
    pub async fn count_by_backend(&self) -> DocResult<Vec<(String, i64)>> {
        documents::count_by_backend(&self.db).await
    }

    /// Payload of a document, from the record's cache unless missing or forced
    pub async fn get_contents<'r>(
        &self,
        record: &'r mut DocumentRecord,
        force_refetch: bool,
    ) -> DocResult<&'r [u8]> {
        if record.is_new() {
            return record.contents().ok_or_else(|| {
                DocError::InvalidState("Unsaved document has no contents".to_string())
            });
        }

        if force_refetch || !record.has_contents() {
            let id = record.require_id()?.to_string();
            let bytes = match self.registry.placement(record.backend_id()).await? {
                Placement::Inline => documents::fetch_inline_contents(&self.db, &id)
                    .await?
                    .ok_or_else(|| {
                        DocError::NotFound(format!("Document {} has no inline contents", id))
                    })?,
                Placement::External(backend) => {
                    debug!(
                        "Fetching document {} from backend '{}'",
                        id,
                        record.backend_id()
                    );
                    instrumented(record.backend_id(), "read", backend.read(&id)).await?
                }
            };
            record.cache_contents(bytes);
        }

        record
            .contents()
            .ok_or_else(|| DocError::Internal("Contents missing after load".to_string()))
    }

    /// Make sure the record's payload is cached
    pub async fn ensure_loaded(&self, record: &mut DocumentRecord) -> DocResult<()> {
        self.get_contents(record, false).await.map(|_| ())
    }

    /// Delete metadata, then best-effort purge the payload
    pub async fn delete(&self, record: DocumentRecord) -> DocResult<()> {
        let result = self.delete_inner(&record).await;
        metrics::record_document_operation("delete", &result);
        result
    }

    async fn delete_inner(&self, record: &DocumentRecord) -> DocResult<()> {
        let id = record.require_id()?;
        let removed = documents::delete(&self.db, id).await?;
        if removed == 0 {
            return Err(DocError::NotFound(format!("Document not found: {}", id)));
        }
        info!("Deleted document {} ({})", id, record.name());

        let backend_id = record.stored_backend_id().unwrap_or(record.backend_id());
        if backend_id != INLINE_BACKEND_ID {
            if let Err(e) = self.purge_payload(backend_id, id).await {
                error!(
                    "Document {} deleted but its payload could not be removed from backend '{}': {}",
                    id, backend_id, e
                );
                metrics::record_cleanup_failure("delete");
            }
        }

        Ok(())
    }

    /// Look a document up and delete it
    pub async fn delete_by_id(&self, id: &str) -> DocResult<()> {
        let record = self.find(id).await?;
        self.delete(record).await
    }

    async fn purge_payload(&self, backend_id: &str, id: &str) -> DocResult<()> {
        let backend = self.registry.resolve(backend_id).await?;
        instrumented(backend_id, "delete", backend.delete(id)).await
    }

    /// Move a document's payload to another backend, keeping its id
    ///
    /// The contents must already be cached on the record. On failure the
    /// record's backend id is restored to its value before the call; the
    /// persisted metadata is unchanged because metadata is only written after
    /// the destination accepted the payload.
    pub async fn move_to(
        &self,
        record: &mut DocumentRecord,
        destination: &str,
    ) -> DocResult<MoveOutcome> {
        let result = self.move_inner(record, destination).await;
        metrics::record_document_operation("move", &result);
        result
    }

    async fn move_inner(
        &self,
        record: &mut DocumentRecord,
        destination: &str,
    ) -> DocResult<MoveOutcome> {
        if destination == record.backend_id() {
            debug!(
                "Document {} already on backend '{}'",
                record.id().unwrap_or("<new>"),
                destination
            );
            return Ok(MoveOutcome::Unchanged);
        }
        if !record.has_contents() {
            return Err(DocError::InvalidState(format!(
                "Contents of document {} must be loaded before moving it",
                record.id().unwrap_or("<new>")
            )));
        }

        let previous_backend = record.backend_id().to_string();
        let previous_dirty = record.has_pending_contents();
        let previous_location = match (record.id(), record.stored_backend_id()) {
            (Some(id), Some(stored)) => Some((id.to_string(), stored.to_string())),
            _ => None,
        };

        record.set_backend_id(destination);
        record.mark_contents_dirty();
        if let Err(e) = self.save(record).await {
            warn!(
                "Moving document {} from '{}' to '{}' failed: {}",
                record.id().unwrap_or("<new>"),
                previous_backend,
                destination,
                e
            );
            record.restore_after_failed_move(previous_backend, previous_dirty);
            return Err(e);
        }

        if let Some((id, stored_backend)) = previous_location {
            info!(
                "Moved document {} from '{}' to '{}'",
                id, stored_backend, destination
            );
            if stored_backend != INLINE_BACKEND_ID && stored_backend != destination {
                if let Err(e) = self.purge_payload(&stored_backend, &id).await {
                    warn!(
                        "Document {} moved but its old payload remains on backend '{}': {}",
                        id, stored_backend, e
                    );
                    metrics::record_cleanup_failure("move");
                }
            }
        }

        Ok(MoveOutcome::Moved {
            from: previous_backend,
        })
    }

    /// Move every document on `from` to `to`, collecting per-document failures
    pub async fn migrate_backend(
        &self,
        from: &str,
        to: &str,
        batch_size: u32,
    ) -> DocResult<MigrationReport> {
        if batch_size == 0 {
            return Err(DocError::Validation("batch size must be positive".to_string()));
        }
        for backend_id in [from, to] {
            if !self.registry.is_known(backend_id) {
                return Err(DocError::Config(format!("unknown backend id: {}", backend_id)));
            }
        }

        let mut report = MigrationReport::default();
        if from == to {
            return Ok(report);
        }

        info!("Migrating documents from '{}' to '{}'", from, to);
        loop {
            // Moved documents leave the listing; failed ones stay in front
            let offset = report.failed.len() as i64;
            let rows = documents::list(&self.db, Some(from), i64::from(batch_size), offset).await?;
            if rows.is_empty() {
                break;
            }

            for row in rows {
                let mut record = DocumentRecord::from_row(row);
                let id = record.require_id()?.to_string();
                let result = match self.ensure_loaded(&mut record).await {
                    Ok(()) => self.move_to(&mut record, to).await.map(|_| ()),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => report.moved.push(id),
                    Err(e) => {
                        warn!("Could not migrate document {}: {}", id, e);
                        report.failed.push(MigrationFailure {
                            id,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "Migration from '{}' to '{}' done: {} moved, {} failed",
            from,
            to,
            report.moved.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
