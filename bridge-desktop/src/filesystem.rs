//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fs::FileTimes;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Tokio-based file system implementation
///
/// Parent directories are created on demand for writes, so callers only need
/// to know the final path of a file.
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

fn to_system_time(time: DateTime<Utc>) -> SystemTime {
    match u64::try_from(time.timestamp()) {
        Ok(secs) => UNIX_EPOCH + std::time::Duration::new(secs, time.timestamp_subsec_nanos()),
        // Pre-epoch timestamps clamp to the epoch
        Err(_) => UNIX_EPOCH,
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;
        fs::write(path, data.as_ref()).await?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_parent(to).await?;
        fs::rename(from, to).await?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn set_modified_time(&self, path: &Path, time: DateTime<Utc>) -> Result<()> {
        let path = path.to_path_buf();
        let when = to_system_time(time);

        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new().write(true).open(&path)?;
            file.set_times(FileTimes::new().set_accessed(when).set_modified(when))
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Timestamp task failed: {}", e)))??;

        Ok(())
    }

    async fn open_read_stream(&self, path: &Path) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = fs::File::open(path).await?;
        debug!(path = ?path, "Opened file for reading");
        Ok(Box::new(file))
    }

    async fn open_write_stream(&self, path: &Path) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        self.ensure_parent(path).await?;
        let file = fs::File::create(path).await?;
        debug!(path = ?path, "Opened file for writing");
        Ok(Box::new(file))
    }
}
