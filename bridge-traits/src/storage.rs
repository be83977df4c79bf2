//! Storage and File System Abstractions
//!
//! Platform-agnostic traits for the backup tree on disk and for key-value
//! settings storage.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts the file I/O the downloader needs so tests can point it at a
/// temporary directory.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn publish(fs: &dyn FileSystemAccess, tmp: &Path, target: &Path) -> Result<()> {
///     fs.create_dir_all(target.parent().unwrap()).await?;
///     fs.rename(tmp, target).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Atomically replace `to` with `from` (same filesystem)
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Set both access and modification time of a file
    async fn set_modified_time(&self, path: &Path, time: DateTime<Utc>) -> Result<()>;

    /// Open a file for streaming reads
    async fn open_read_stream(&self, path: &Path) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Open a file for streaming writes, truncating any previous content
    async fn open_write_stream(&self, path: &Path) -> Result<Box<dyn AsyncWrite + Send + Unpin>>;
}

/// Key-value settings storage trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_i64("backup.scanner_job_delay_secs", 120).await?;
///     store.set_bool("backup.photos_enabled", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;
}
