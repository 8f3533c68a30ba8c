//! Crash-safe JSON file persistence.
//!
//! Every write serializes the complete document into a sibling temporary
//! file, flushes it to disk and atomically renames it over the target. A
//! crash at any point leaves either the previous complete document or the new
//! complete document on disk, never a truncated one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

const TMP_MARKER: &str = ".tmp-";

/// A JSON document on disk that is only ever replaced atomically.
#[derive(Debug, Clone)]
pub struct AtomicJsonFile {
    path: PathBuf,
}

impl AtomicJsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the document with `value`.
    pub async fn write<T: Serialize + ?Sized>(&self, value: &T) -> DomainResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(&bytes).await
    }

    /// Replace the document with already serialized JSON.
    pub async fn write_bytes(&self, bytes: &[u8]) -> DomainResult<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent).await?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DomainError::StorageFailure(format!("invalid log path {}", self.path.display()))
            })?;
        let tmp_path = parent.join(format!("{file_name}{TMP_MARKER}{}", Uuid::new_v4().simple()));

        let write_result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(DomainError::StorageFailure(format!(
                "failed to write {}: {e}",
                self.path.display()
            )));
        }

        // Make the rename itself durable where the platform allows it.
        if let Ok(dir) = fs::File::open(&parent).await {
            let _ = dir.sync_all().await;
        }

        Ok(())
    }

    /// Read the document, returning `None` when it does not exist yet.
    ///
    /// I/O failures are [`DomainError::StorageFailure`]; a document that is
    /// not valid JSON for `T` is [`DomainError::SerializationError`].
    pub async fn read<T: DeserializeOwned>(&self) -> DomainResult<Option<T>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| {
            DomainError::SerializationError(format!("{} is not valid JSON: {e}", self.path.display()))
        })?;
        Ok(Some(value))
    }

    /// Remove temporary files left behind by interrupted writes.
    ///
    /// Returns the number of files removed.
    pub async fn remove_stale_temporaries(&self) -> DomainResult<usize> {
        let Some(parent) = self.path.parent() else {
            return Ok(0);
        };
        let Some(file_name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Ok(0);
        };
        let prefix = format!("{file_name}{TMP_MARKER}");

        let mut entries = match fs::read_dir(parent).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| n.starts_with(&prefix)) {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path().join("nested/log.json"));

        let mut doc = BTreeMap::new();
        doc.insert("alpha".to_string(), vec![1, 2, 3]);
        file.write(&doc).await.unwrap();

        let back: BTreeMap<String, Vec<u32>> = file.read().await.unwrap().unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn test_missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path().join("absent.json"));
        let value: Option<Vec<u32>> = file.read().await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path().join("log.json"));
        file.write(&vec![1]).await.unwrap();
        file.write(&vec![1, 2]).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["log.json".to_string()]);
        let value: Vec<u32> = file.read().await.unwrap().unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path().join("log.json"));
        file.write(&vec![1, 2, 3]).await.unwrap();

        // Simulate a crash mid-write: a half-written temporary next to the log.
        std::fs::write(dir.path().join("log.json.tmp-deadbeef"), b"[1, 2, 3, 4").unwrap();

        let value: Vec<u32> = file.read().await.unwrap().unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(file.remove_stale_temporaries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = AtomicJsonFile::new(path).read::<Vec<u32>>().await.unwrap_err();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }

    #[tokio::test]
    async fn test_unreadable_document_is_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::create_dir(&path).unwrap();
        let err = AtomicJsonFile::new(path).read::<Vec<u32>>().await.unwrap_err();
        assert!(matches!(err, DomainError::StorageFailure(_)));
    }
}
