use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::connection::JsonConnection;
use crate::storage::traits::PhotoStorage;

const PHOTOS_DIR: &str = "photos";

/// Binary photo store. Files are keyed by child id, upload timestamp, and
/// the sanitized original file name, and served back under `/photos/`.
#[derive(Clone)]
pub struct PhotoRepository {
    connection: Arc<JsonConnection>,
}

impl PhotoRepository {
    pub fn new(connection: Arc<JsonConnection>) -> Self {
        Self { connection }
    }

    /// Generate a safe object key segment from an arbitrary file name.
    /// Keeps the extension separator, maps everything else unfriendly to
    /// underscores, and collapses runs.
    pub fn sanitize_file_name(file_name: &str) -> String {
        let mapped: String = file_name
            .chars()
            .map(|c| match c {
                c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
                '.' | '-' => c,
                _ => '_',
            })
            .collect();

        let mut collapsed = String::new();
        let mut last_was_underscore = false;
        for c in mapped.chars() {
            if c == '_' {
                if !last_was_underscore {
                    collapsed.push('_');
                }
                last_was_underscore = true;
            } else {
                collapsed.push(c);
                last_was_underscore = false;
            }
        }

        collapsed.trim_matches('_').to_string()
    }
}

#[async_trait]
impl PhotoStorage for PhotoRepository {
    async fn save_photo(&self, child_id: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
        let dir = self.connection.base_directory().join(PHOTOS_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create photo directory {}", dir.display()))?;

        let object_name = format!(
            "{}_{}_{}",
            Self::sanitize_file_name(child_id),
            Utc::now().timestamp_millis(),
            Self::sanitize_file_name(file_name),
        );

        let path = dir.join(&object_name);
        let temp = dir.join(format!("{object_name}.tmp"));
        fs::write(&temp, bytes)
            .with_context(|| format!("Failed to write photo {}", temp.display()))?;
        fs::rename(&temp, &path)
            .with_context(|| format!("Failed to publish photo {}", path.display()))?;

        info!("Stored photo {object_name} ({} bytes)", bytes.len());
        Ok(format!("/photos/{object_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (PhotoRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let connection = JsonConnection::new(temp_dir.path()).unwrap();
        (PhotoRepository::new(Arc::new(connection)), temp_dir)
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(PhotoRepository::sanitize_file_name("Emma Smith.JPG"), "emma_smith.jpg");
        assert_eq!(PhotoRepository::sanitize_file_name("photo (1).png"), "photo_1_.png");
        assert_eq!(PhotoRepository::sanitize_file_name("child::abc"), "child_abc");
        assert_eq!(PhotoRepository::sanitize_file_name("__odd__"), "odd");
    }

    #[tokio::test]
    async fn test_save_photo_returns_servable_url() {
        let (repo, dir) = setup();

        let url = repo
            .save_photo("child::abc", "Portrait.jpg", b"not really a jpeg")
            .await
            .unwrap();

        assert!(url.starts_with("/photos/child_abc_"));
        assert!(url.ends_with("portrait.jpg"));

        let stored = dir.path().join(url.trim_start_matches('/'));
        assert_eq!(fs::read(stored).unwrap(), b"not really a jpeg");
    }
}
