//! Disk-based storage backend
use crate::{
    backend::StorageBackend,
    error::{DocError, DocResult},
};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Disk storage backend
///
/// Stores payloads on the local filesystem with directory sharding
/// based on key prefixes to prevent too many files in one directory.
#[derive(Clone, Debug)]
pub struct DiskBackend {
    base_path: PathBuf,
}

impl DiskBackend {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the file path for a key
    ///
    /// Uses directory sharding: {base}/{first2chars}/{key}
    /// For example, key "9f1c2e7a-..." -> {base}/9f/9f1c2e7a-...
    fn path_for(&self, key: &str) -> DocResult<PathBuf> {
        if key.is_empty() || key.contains(|c: char| c == '/' || c == '\\') || key.starts_with('.') {
            return Err(DocError::Storage(format!("Invalid storage key: {:?}", key)));
        }
        let shard = key.get(0..2).unwrap_or("_");
        Ok(self.base_path.join(shard).join(key))
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    fn kind(&self) -> &'static str {
        "disk"
    }

    async fn read(&self, key: &str) -> DocResult<Vec<u8>> {
        let path = self.path_for(key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DocError::NotFound(format!("No payload stored under {}", key)))
            }
            Err(e) => Err(DocError::Storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    async fn write(&self, key: &str, data: &[u8]) -> DocResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                DocError::Storage(format!("Failed to create directory for {}: {}", key, e))
            })?;
        }

        // Readers never observe a partially written payload
        let tmp = path.with_extension("partial");
        fs::write(&tmp, data)
            .await
            .map_err(|e| DocError::Storage(format!("Failed to write {}: {}", key, e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| DocError::Storage(format!("Failed to write {}: {}", key, e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> DocResult<()> {
        let path = self.path_for(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocError::Storage(format!("Failed to delete {}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::new(dir.path().to_path_buf());

        let key = "2b1f4c0e-8d7a-4e0b-9a51-0c7d1e2f3a4b";
        backend.write(key, b"document bytes").await.unwrap();

        let data = backend.read(key).await.unwrap();
        assert_eq!(data, b"document bytes".to_vec());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::new(dir.path().to_path_buf());

        let err = backend.read("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::new(dir.path().to_path_buf());

        backend.write("abc", b"x").await.unwrap();
        backend.delete("abc").await.unwrap();
        backend.delete("abc").await.unwrap();
        assert!(backend.read("abc").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_payload() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::new(dir.path().to_path_buf());

        backend.write("abc", b"first").await.unwrap();
        backend.write("abc", b"second").await.unwrap();
        assert_eq!(backend.read("abc").await.unwrap(), b"second".to_vec());
    }

    #[test]
    fn test_directory_sharding() {
        let backend = DiskBackend::new(PathBuf::from("/data"));

        let path = backend.path_for("9f1c2e7a").unwrap();
        assert_eq!(path, PathBuf::from("/data/9f/9f1c2e7a"));

        let short = backend.path_for("a").unwrap();
        assert_eq!(short, PathBuf::from("/data/_/a"));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let backend = DiskBackend::new(PathBuf::from("/data"));
        assert!(backend.path_for("../etc/passwd").is_err());
        assert!(backend.path_for("").is_err());
    }
}
