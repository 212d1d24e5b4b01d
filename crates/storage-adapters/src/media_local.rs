//! # Local media storage
//!
//! Removes uploaded images from a directory on disk. Paths are relative to
//! the configured root and may not escape it.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use domains::errors::{StoreError, StoreResult};
use domains::ports::MediaStorage;

pub struct LocalMediaStorage {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
}

impl LocalMediaStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root_path: root }
    }

    /// Joins `relative` onto the root, rejecting anything but plain segments.
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let path = Path::new(relative);
        let plain = path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if relative.is_empty() || !plain {
            return None;
        }
        Some(self.root_path.join(path))
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn remove(&self, paths: Vec<String>) -> StoreResult<()> {
        for relative in paths {
            let Some(target) = self.resolve(&relative) else {
                warn!(path = %relative, "skipping media path outside storage root");
                continue;
            };
            match fs::remove_file(&target).await {
                Ok(()) => debug!(path = %relative, "media object removed"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StoreError::Backend(format!(
                        "failed to remove {relative}: {err}"
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("qna-media-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("questions")).unwrap();
        dir
    }

    #[tokio::test]
    async fn removes_files_and_ignores_missing_ones() {
        let root = scratch_dir();
        let file = root.join("questions/a.png");
        std::fs::write(&file, b"png").unwrap();

        let storage = LocalMediaStorage::new(root.clone());
        storage
            .remove(vec!["questions/a.png".into(), "questions/missing.png".into()])
            .await
            .unwrap();
        assert!(!file.exists());

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn traversal_is_rejected() {
        let storage = LocalMediaStorage::new(PathBuf::from("/srv/uploads"));
        assert!(storage.resolve("../etc/passwd").is_none());
        assert!(storage.resolve("/etc/passwd").is_none());
        assert!(storage.resolve("").is_none());
        assert_eq!(
            storage.resolve("answers/b.png"),
            Some(PathBuf::from("/srv/uploads/answers/b.png"))
        );
    }
}
