use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use tokio::fs;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Extensions accepted for order uploads (artwork and documents).
const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "ai", "eps", "psd", "cdr", "svg",
];

/// Stores order uploads on the local filesystem under
/// `<base>/orders/<year>/<month>/` with UUID-based names so client file names
/// never touch the disk layout.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_dir: PathBuf,
}

/// A file persisted by [`FileStorage::store_order_file`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path relative to the storage base directory
    pub relative_path: String,
    /// Size in bytes
    pub size: i64,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Checks a client file name against the upload allow-list.
    pub fn validate_extension(file_name: &str) -> Result<String, ServiceError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            Ok(extension)
        } else {
            Err(ServiceError::ValidationError(format!(
                "File extension '{}' is not allowed. Allowed extensions: {}",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            )))
        }
    }

    /// Writes an order upload to disk and returns its stored location.
    #[instrument(skip(self, data), fields(file_name = %file_name, bytes = data.len()))]
    pub async fn store_order_file(
        &self,
        file_name: &str,
        data: &[u8],
    ) -> Result<StoredFile, ServiceError> {
        let extension = Self::validate_extension(file_name)?;

        let now = Utc::now();
        let relative_dir = format!("orders/{:04}/{:02}", now.year(), now.month());
        let stored_name = format!("{}.{}", Uuid::new_v4(), extension);

        let dir = self.base_dir.join(&relative_dir);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::StorageError(format!("Failed to create {:?}: {}", dir, e)))?;

        let path = dir.join(&stored_name);
        fs::write(&path, data)
            .await
            .map_err(|e| ServiceError::StorageError(format!("Failed to write {:?}: {}", path, e)))?;

        info!("Stored order upload at {:?}", path);

        Ok(StoredFile {
            relative_path: format!("{}/{}", relative_dir, stored_name),
            size: data.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("logo.PDF", "pdf")]
    #[case("art.svg", "svg")]
    #[case("scan.final.jpeg", "jpeg")]
    fn accepts_allowed_extensions(#[case] file_name: &str, #[case] expected: &str) {
        assert_eq!(FileStorage::validate_extension(file_name).unwrap(), expected);
    }

    #[rstest]
    #[case("malware.exe")]
    #[case("archive.zip")]
    #[case("no_extension")]
    fn rejects_disallowed_extensions(#[case] file_name: &str) {
        assert!(FileStorage::validate_extension(file_name).is_err());
    }

    #[tokio::test]
    async fn stores_file_under_dated_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path());

        let stored = storage
            .store_order_file("design.png", b"not really a png")
            .await
            .unwrap();

        assert!(stored.relative_path.starts_with("orders/"));
        assert!(stored.relative_path.ends_with(".png"));
        assert_eq!(stored.size, 16);

        let on_disk = tmp.path().join(&stored.relative_path);
        assert_eq!(fs::read(on_disk).await.unwrap(), b"not really a png");
    }

    #[tokio::test]
    async fn rejected_extension_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path());

        assert!(storage
            .store_order_file("notes.txt", b"plain text")
            .await
            .is_err());
        assert!(fs::read_dir(tmp.path()).await.unwrap().next_entry().await.unwrap().is_none());
    }
}
