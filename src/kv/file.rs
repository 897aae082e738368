//! Filesystem KV store: one `<key>.json` file per entry.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! reader never observes a half-written entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::KvStore;
use crate::{Error, Result};

/// Directory-backed key-value store.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageError`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::StorageError(format!(
                "failed to initialize cache directory '{}': {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    /// Remove every entry managed by this store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageError`] if the directory cannot be listed or an
    /// entry cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::StorageError(format!("failed to list cache directory: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::StorageError(format!("failed to list cache directory: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                remove_if_present(&path).await?;
            }
        }
        Ok(())
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidInput("cache key must be a non-empty string".into()));
        }
        if key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::InvalidInput(format!(
                "cache key '{key}' must not contain path separators or start with '.'"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::StorageError(format!(
            "failed to remove '{}': {e}",
            path.display()
        ))),
    }
}

impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for_key(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageError(format!(
                "failed to read cache entry '{key}': {e}"
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for_key(key)?;
        let tmp_path = path.with_extension("tmp");
        let written = async {
            tokio::fs::write(&tmp_path, &value).await?;
            tokio::fs::rename(&tmp_path, &path).await
        }
        .await;
        if let Err(e) = written {
            remove_if_present(&tmp_path).await?;
            return Err(Error::StorageError(format!(
                "failed to write cache entry '{key}': {e}"
            )));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for_key(key)?;
        remove_if_present(&path).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for_key(key)?;
        tokio::fs::try_exists(&path).await.map_err(|e| {
            Error::StorageError(format!("failed to check cache entry '{key}': {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_kv_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(tmp.path().join("cache")).unwrap();

        store.set("abc123", b"{\"ok\":true}".to_vec()).await.unwrap();

        assert!(store.exists("abc123").await.unwrap());
        assert_eq!(
            store.get("abc123").await.unwrap(),
            Some(b"{\"ok\":true}".to_vec())
        );
        assert!(tmp.path().join("cache").join("abc123.json").exists());
        assert!(!tmp.path().join("cache").join("abc123.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_kv_missing_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(tmp.path()).unwrap();

        assert_eq!(store.get("absent").await.unwrap(), None);
        assert!(!store.exists("absent").await.unwrap());
        store.delete("absent").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_kv_rejects_empty_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(tmp.path()).unwrap();

        let err = store.set("   ", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.get("../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_file_kv_exists_reports_io_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("cache");
        let store = FileKvStore::open(&root).unwrap();
        std::fs::remove_dir(&root).unwrap();
        std::fs::write(&root, b"not a directory").unwrap();

        let err = store.exists("abc123").await.unwrap_err();

        assert!(matches!(err, Error::StorageError(ref msg) if msg.contains("abc123")));
    }

    #[tokio::test]
    async fn test_file_kv_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(tmp.path()).unwrap();
        store.set("a", b"1".to_vec()).await.unwrap();
        store.set("b", b"2".to_vec()).await.unwrap();

        store.clear().await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_kv_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        FileKvStore::open(tmp.path())
            .unwrap()
            .set("persisted", b"yes".to_vec())
            .await
            .unwrap();

        let reopened = FileKvStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.get("persisted").await.unwrap(), Some(b"yes".to_vec()));
    }
}
