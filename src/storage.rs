// src/storage.rs

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

/// Storage backend for uploaded image bytes.
///
/// Paths are relative (`{slot_dir}/{filename}`); implementations own the
/// mapping to their actual location. Abstracting this keeps the attachment
/// lifecycle testable without a real disk layout.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write `data` to `path`, atomically: a concurrent reader sees either
    /// nothing or the complete file, never a partial write.
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), AppError>;

    /// Read the full contents at `path`. `NotFound` if absent.
    async fn read(&self, path: &str) -> Result<Vec<u8>, AppError>;

    /// Delete the file at `path`. Deleting an absent file is success.
    async fn delete(&self, path: &str) -> Result<(), AppError>;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, AppError>;
}

/// Local-filesystem store rooted at the configured upload directory.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), AppError> {
        let full_path = self.full_path(path);
        tracing::debug!(path = %path, size = data.len(), "storage write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Temp file + rename keeps the write atomic. Final filenames are
        // freshly generated per upload, so the temp name cannot collide.
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, AppError> {
        match fs::read(self.full_path(path)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        match fs::remove_file(self.full_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, AppError> {
        Ok(fs::try_exists(self.full_path(path)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store
            .write("question_images/a.png", b"payload")
            .await
            .unwrap();
        let data = store.read("question_images/a.png").await.unwrap();
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn write_creates_nested_directories() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("deep").join("root"));

        store.write("explanation_images/b.jpg", b"x").await.unwrap();
        assert!(store.exists("explanation_images/b.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn write_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write("question_images/c.png", b"x").await.unwrap();
        assert!(!store.exists("question_images/c.tmp").await.unwrap());
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        match store.read("question_images/missing.png").await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|d| d.len())),
        }
    }

    #[tokio::test]
    async fn delete_missing_is_a_noop() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.delete("question_images/missing.png").await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write("question_images/d.webp", b"x").await.unwrap();
        store.delete("question_images/d.webp").await.unwrap();
        assert!(!store.exists("question_images/d.webp").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write("question_images/e.gif", b"old").await.unwrap();
        store.write("question_images/e.gif", b"new").await.unwrap();
        assert_eq!(store.read("question_images/e.gif").await.unwrap(), b"new");
    }
}
