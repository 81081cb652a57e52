use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AdmissionError;

/// Directory accepted uploads are written to.
///
/// Files are only ever created under generated names, never under a name
/// supplied by the uploader.
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
}

impl UploadStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, AdmissionError> {
        let store = Self { base_path };
        store.ensure_dir().await?;

        info!(path = %store.base_path.display(), "Upload store initialized");
        Ok(store)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Create the directory (recursively) if it went missing.
    pub async fn ensure_dir(&self) -> Result<(), AdmissionError> {
        fs::create_dir_all(&self.base_path).await.map_err(|e| {
            AdmissionError::StorageFailure(format!(
                "Failed to create upload directory '{}': {}",
                self.base_path.display(),
                e
            ))
        })
    }

    /// A fresh `<uuid>.<ext>` name.
    pub fn generate_name(ext: &str) -> String {
        format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase())
    }

    /// Resolve a stored name to a path, rejecting anything that would leave
    /// the upload directory.
    pub fn path_for(&self, stored_name: &str) -> Result<PathBuf, AdmissionError> {
        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.base_path.join(name)),
            _ => Err(AdmissionError::StorageFailure(format!(
                "Refusing to store outside upload directory: {stored_name:?}"
            ))),
        }
    }

    /// Open a new file exclusively. Fails if the name is already taken.
    pub async fn create_new(&self, stored_name: &str) -> Result<(PathBuf, fs::File), AdmissionError> {
        let path = self.path_for(stored_name)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                AdmissionError::StorageFailure(format!(
                    "Failed to create {}: {}",
                    path.display(),
                    e
                ))
            })?;

        debug!(path = %path.display(), "Created upload file");
        Ok((path, file))
    }

    /// Remove a file left behind by a failed admission. Never fails.
    pub async fn discard(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed partial upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial upload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn test_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("uploads");
        let store = UploadStore::new(base.clone()).await.unwrap();
        assert!(base.is_dir());

        std::fs::remove_dir_all(&base).unwrap();
        store.ensure_dir().await.unwrap();
        assert!(base.is_dir());
    }

    #[test]
    fn test_generated_names_are_unique() {
        let a = UploadStore::generate_name("PNG");
        let b = UploadStore::generate_name("png");
        assert_ne!(a, b);
        assert!(a.ends_with(".png"));
        assert_eq!(a.len(), 36 + 4);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf()).await.unwrap();

        assert!(store.path_for("../escape.png").is_err());
        assert!(store.path_for("/etc/passwd").is_err());
        assert!(store.path_for("a/b.png").is_err());
        assert!(store.path_for("").is_err());
        assert_eq!(store.path_for("ok.png").unwrap(), dir.path().join("ok.png"));
    }

    #[tokio::test]
    async fn test_create_new_is_exclusive_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf()).await.unwrap();

        let (path, mut file) = store.create_new("x.png").await.unwrap();
        file.write_all(b"data").await.unwrap();
        drop(file);

        assert!(store.create_new("x.png").await.is_err());

        store.discard(&path).await;
        assert!(!path.exists());
        // Discarding twice is harmless.
        store.discard(&path).await;
    }
}
