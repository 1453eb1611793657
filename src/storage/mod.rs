//! Pluggable storage for uploaded event media.
//!
//! The default backend writes files to a local directory which the server
//! exposes under `/media/`. The trait boundary keeps a cloud backend
//! possible without touching the handlers.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Reference to the event image used when no image was uploaded.
pub const DEFAULT_EVENT_IMAGE: &str = "default_event.png";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored media file: its public URL and the catalog type tag.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub url: String,
    pub media_type: String,
}

impl StoredFile {
    pub fn is_image(&self) -> bool {
        self.media_type == "image"
    }
}

/// Classify an upload by its declared content type.
pub fn classify_media_type(content_type: &str) -> &'static str {
    if content_type.starts_with("image/") {
        "image"
    } else {
        "video"
    }
}

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Persist an uploaded file, returning its public reference.
    async fn store(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError>;
}

/// Local-disk backend.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

/// Keep only characters that are safe in a filename.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl MediaStorage for LocalStorage {
    async fn store(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let filename = format!(
            "{}_{}",
            uuid::Uuid::new_v4(),
            sanitize_filename(original_name)
        );
        let path = self.root.join(&filename);

        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(file = %filename, size = bytes.len(), "Stored media file");

        Ok(StoredFile {
            url: format!("/media/{}", filename),
            media_type: classify_media_type(content_type).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_media_type() {
        assert_eq!(classify_media_type("image/png"), "image");
        assert_eq!(classify_media_type("image/jpeg"), "image");
        assert_eq!(classify_media_type("video/mp4"), "video");
        assert_eq!(classify_media_type("application/pdf"), "video");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("party pic.png"), "party_pic.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[tokio::test]
    async fn test_local_storage_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());

        let stored = storage
            .store("flyer.png", "image/png", b"fake png bytes")
            .await
            .unwrap();

        assert!(stored.is_image());
        assert!(stored.url.starts_with("/media/"));
        let on_disk = dir.path().join(stored.url.trim_start_matches("/media/"));
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"fake png bytes");
    }
}
