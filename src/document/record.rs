//! Document record and upload models
use crate::backend::INLINE_BACKEND_ID;
use crate::db::documents::DocumentRow;
use crate::error::{DocError, DocResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use validator::Validate;

/// Uploaded file handed over by an outer layer (HTTP form, CLI, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a local file. The MIME type is guessed from the extension unless given.
    pub async fn from_path(path: &Path, mime_type: Option<&str>) -> DocResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DocError::Validation(format!("{} has no file name", path.display())))?;
        let mime_type = match mime_type {
            Some(mime) => mime.to_string(),
            None => mime_guess::from_path(path).first_or_octet_stream().to_string(),
        };
        let bytes = tokio::fs::read(path).await?;

        Ok(Self::new(name, mime_type, bytes))
    }
}

/// Metadata snapshot of a document, suitable for listings and JSON output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub id: Option<String>,
    pub name: String,
    pub mime_type: String,
    pub backend_id: String,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    /// Payload size when the contents are loaded
    pub size: Option<usize>,
}

/// A stored document: metadata plus the (lazily loaded) payload
///
/// Payload bytes are cached in the record once loaded or set. Contents set
/// through [`DocumentRecord::set_contents`] are written on the next save;
/// contents loaded from storage are not.
#[derive(Clone, Validate)]
pub struct DocumentRecord {
    id: Option<String>,
    #[validate(length(min = 1, max = 255, message = "name must be 1 to 255 characters"))]
    name: String,
    #[validate(length(min = 1, max = 255, message = "MIME type must be 1 to 255 characters"))]
    mime_type: String,
    #[validate(length(min = 1, max = 255, message = "backend id must be 1 to 255 characters"))]
    backend_id: String,
    created_at: Option<i64>,
    updated_at: Option<i64>,
    contents: Option<Vec<u8>>,
    contents_dirty: bool,
    /// Backend id as of the last load or save
    stored_backend_id: Option<String>,
}

impl DocumentRecord {
    /// New, unsaved document on the given backend
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        backend_id: impl Into<String>,
        contents: Vec<u8>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            mime_type: mime_type.into(),
            backend_id: backend_id.into(),
            created_at: None,
            updated_at: None,
            contents: Some(contents),
            contents_dirty: true,
            stored_backend_id: None,
        }
    }

    /// New, unsaved document with inline storage
    pub fn inline(name: impl Into<String>, mime_type: impl Into<String>, contents: Vec<u8>) -> Self {
        Self::new(name, mime_type, INLINE_BACKEND_ID, contents)
    }

    pub fn from_upload(upload: Upload, backend_id: impl Into<String>) -> Self {
        Self::new(upload.name, upload.mime_type, backend_id, upload.bytes)
    }

    /// Replace name, MIME type and contents. Not persisted until saved.
    pub fn apply_upload(&mut self, upload: Upload) {
        self.name = upload.name;
        self.mime_type = upload.mime_type;
        self.set_contents(upload.bytes);
    }

    pub(crate) fn from_row(row: DocumentRow) -> Self {
        Self {
            id: Some(row.id),
            name: row.name,
            mime_type: row.mime_type,
            stored_backend_id: Some(row.backend_id.clone()),
            backend_id: row.backend_id,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
            contents: row.local_contents,
            contents_dirty: false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.updated_at
    }

    /// Cached payload, if loaded or set
    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_deref()
    }

    pub fn has_contents(&self) -> bool {
        self.contents.is_some()
    }

    /// Whether the cached contents still need to be written
    pub fn has_pending_contents(&self) -> bool {
        self.contents_dirty
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_inline(&self) -> bool {
        self.backend_id == INLINE_BACKEND_ID
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = mime_type.into();
    }

    pub fn set_contents(&mut self, contents: Vec<u8>) {
        self.contents = Some(contents);
        self.contents_dirty = true;
    }

    /// Drop the cached payload, including contents set but not yet saved
    pub fn invalidate_contents(&mut self) {
        self.contents = None;
        self.contents_dirty = false;
    }

    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            backend_id: self.backend_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            size: self.contents.as_ref().map(Vec::len),
        }
    }

    pub(crate) fn require_id(&self) -> DocResult<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| DocError::InvalidState("Document has not been saved yet".to_string()))
    }

    pub(crate) fn stored_backend_id(&self) -> Option<&str> {
        self.stored_backend_id.as_deref()
    }

    /// The backend differs from where the payload was last persisted
    pub(crate) fn backend_changed(&self) -> bool {
        match &self.stored_backend_id {
            Some(stored) => stored != &self.backend_id,
            None => false,
        }
    }

    pub(crate) fn set_backend_id(&mut self, backend_id: impl Into<String>) {
        self.backend_id = backend_id.into();
    }

    pub(crate) fn mark_contents_dirty(&mut self) {
        self.contents_dirty = true;
    }

    pub(crate) fn restore_after_failed_move(&mut self, backend_id: String, contents_dirty: bool) {
        self.backend_id = backend_id;
        self.contents_dirty = contents_dirty;
    }

    /// Cache contents read back from storage
    pub(crate) fn cache_contents(&mut self, contents: Vec<u8>) {
        self.contents = Some(contents);
        self.contents_dirty = false;
    }

    pub(crate) fn mark_saved(&mut self, id: String, timestamp: i64) {
        if self.id.is_none() {
            self.created_at = Some(timestamp);
        }
        self.id = Some(id);
        self.updated_at = Some(timestamp);
        self.contents_dirty = false;
        self.stored_backend_id = Some(self.backend_id.clone());
    }
}

impl fmt::Debug for DocumentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("backend_id", &self.backend_id)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("contents_len", &self.contents.as_ref().map(Vec::len))
            .field("contents_dirty", &self.contents_dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_pending_contents() {
        let record = DocumentRecord::inline("a.txt", "text/plain", b"hello".to_vec());
        assert!(record.is_new());
        assert!(record.is_inline());
        assert!(record.has_pending_contents());
        assert_eq!(record.contents(), Some(b"hello".as_slice()));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validation_limits() {
        let mut record = DocumentRecord::inline("", "text/plain", vec![]);
        let err = DocError::from(record.validate().unwrap_err());
        assert!(err.to_string().contains("name must be 1 to 255 characters"));

        record.set_name("n".repeat(255));
        assert!(record.validate().is_ok());

        record.set_mime_type("m".repeat(256));
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        // 255 multi-byte characters are still within bounds
        let record = DocumentRecord::inline("é".repeat(255), "text/plain", vec![]);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_apply_upload_marks_dirty() {
        let row = DocumentRow {
            id: "id-1".to_string(),
            name: "old.txt".to_string(),
            mime_type: "text/plain".to_string(),
            backend_id: "archive".to_string(),
            local_contents: None,
            created_at: 10,
            updated_at: 20,
        };
        let mut record = DocumentRecord::from_row(row);
        assert!(!record.has_contents());
        assert!(!record.has_pending_contents());

        record.apply_upload(Upload::new("new.csv", "text/csv", b"a,b".to_vec()));
        assert_eq!(record.name(), "new.csv");
        assert_eq!(record.mime_type(), "text/csv");
        assert!(record.has_pending_contents());
        assert!(!record.backend_changed());
    }

    #[test]
    fn test_mark_saved_sets_timestamps_once() {
        let mut record = DocumentRecord::inline("a.txt", "text/plain", b"x".to_vec());
        record.mark_saved("id-1".to_string(), 100);
        assert_eq!(record.created_at(), Some(100));
        assert_eq!(record.updated_at(), Some(100));
        assert!(!record.has_pending_contents());

        record.mark_saved("id-1".to_string(), 200);
        assert_eq!(record.created_at(), Some(100));
        assert_eq!(record.updated_at(), Some(200));
    }

    #[test]
    fn test_info_reports_size() {
        let record = DocumentRecord::new("a.bin", "application/octet-stream", "archive", vec![0; 42]);
        let info = record.info();
        assert_eq!(info.size, Some(42));
        assert_eq!(info.backend_id, "archive");
        assert!(info.id.is_none());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["mimeType"], "application/octet-stream");
    }

    #[test]
    fn test_debug_hides_payload() {
        let record = DocumentRecord::inline("a.txt", "text/plain", b"secret".to_vec());
        let debug = format!("{:?}", record);
        assert!(debug.contains("contents_len: Some(6)"));
        assert!(!debug.contains("115, 101"));
    }

    #[tokio::test]
    async fn test_upload_from_path_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let upload = Upload::from_path(&path, None).await.unwrap();
        assert_eq!(upload.name, "notes.txt");
        assert_eq!(upload.mime_type, "text/plain");
        assert_eq!(upload.bytes, b"hello".to_vec());

        let forced = Upload::from_path(&path, Some("text/markdown")).await.unwrap();
        assert_eq!(forced.mime_type, "text/markdown");
    }
}
