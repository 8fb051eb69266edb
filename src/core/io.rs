use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Replaces `path` in one step; a failed write leaves no file behind.
    async fn write(&self, path: &Path, content: &[u8]) -> Result<()>;
    async fn exists(&self, path: &Path) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

/// Hidden sibling used while a write is in flight, e.g. `ch01/.ch01_s1.mp3.part`.
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.part", name))
}

#[async_trait]
impl Storage for NativeStorage {
    async fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let partial = partial_path(path);
        let written = match tokio::fs::write(&partial, content).await {
            Ok(()) => tokio::fs::rename(&partial, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e).with_context(|| format!("Failed to write {}", path.display()));
        }
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parent_directories() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("ch01").join("ch01_s1_welcome.mp3");
        let storage = NativeStorage::new();

        storage.write(&path, b"ID3").await?;

        assert!(storage.exists(&path).await?);
        assert_eq!(std::fs::read(&path)?, b"ID3");
        assert!(
            !partial_path(&path).exists(),
            "Partial file should be renamed away"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_write_replaces_existing_file() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("out.mp3");
        let storage = NativeStorage::new();

        storage.write(&path, b"old").await?;
        storage.write(&path, b"new").await?;

        assert_eq!(std::fs::read(&path)?, b"new");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        // A directory in the way makes the final rename fail.
        let path = temp_dir.path().join("blocked.mp3");
        std::fs::create_dir(&path)?;
        std::fs::write(path.join("keep"), b"x")?;
        let storage = NativeStorage::new();

        let result = storage.write(&path, b"data").await;

        assert!(result.is_err());
        assert!(!partial_path(&path).exists());
        assert!(path.is_dir());
        Ok(())
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("out/ch01/ch01_s1.mp3")),
            PathBuf::from("out/ch01/.ch01_s1.mp3.part")
        );
    }
}
