//! # File Records
//!
//! Tracks which media items are on disk, where they live and which ones
//! could not be downloaded.
//!
//! ## Overview
//!
//! - [`generate_path`] derives the storage path `{account}/{year}/{month}/{filename}`
//!   from the item's creation time (UTC, month without zero padding).
//! - [`FileRecord`] pairs that path with a snapshot of the item metadata and is
//!   stored after a successful download.
//! - [`FilesManager`] answers "is this item already backed up?" by combining the
//!   file system with the stored record, hashes files and restores creation
//!   timestamps.
//! - The download error log keeps the last failure message per item.

use crate::{BackupError, Result};
use async_trait::async_trait;
use bridge_traits::catalog::MediaItem;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// SHA-256 of a file's content.
pub type ContentDigest = [u8; 32];

const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// A media item that has been written to the backup tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the backup root, `/`-separated
    pub file_path_name: String,
    pub media_item: MediaItem,
}

/// Last recorded download failure for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadErrorRecord {
    pub media_item_id: String,
    pub message: String,
    /// Unix seconds
    pub recorded_at: i64,
}

/// Relative storage path for an item.
///
/// # Errors
///
/// Returns [`BackupError::InvalidTimestamp`] when the creation time is not
/// RFC 3339.
pub fn generate_path(account: &str, item: &MediaItem) -> Result<String> {
    let created = item
        .media_metadata
        .parsed_creation_time()
        .map_err(|_| BackupError::InvalidTimestamp {
            media_item_id: item.id.clone(),
            value: item.media_metadata.creation_time.clone(),
        })?;

    Ok(format!(
        "{}/{}/{}/{}",
        account,
        created.year(),
        created.month(),
        sanitize_filename(item)
    ))
}

/// Keep provider filenames inside their month directory.
fn sanitize_filename(item: &MediaItem) -> String {
    let name: String = item
        .filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();

    match name.as_str() {
        "" | "." | ".." => item.id.clone(),
        _ => name,
    }
}

/// Join a `/`-separated relative path onto the backup root.
pub fn absolute_path(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Hash everything `reader` yields.
pub async fn hash_reader<R>(reader: &mut R) -> std::io::Result<ContentDigest>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().into())
}

#[async_trait]
pub trait FileRecordRepository: Send + Sync {
    /// Upsert the record keyed by `(account, record.media_item.id)`.
    async fn save_file_record(&self, account: &str, record: &FileRecord) -> Result<()>;

    async fn get_file_record(&self, account: &str, media_item_id: &str)
        -> Result<Option<FileRecord>>;

    /// Overwrites any earlier message for the same item.
    async fn save_download_error(
        &self,
        account: &str,
        media_item_id: &str,
        message: &str,
    ) -> Result<()>;

    /// Failures for the account, ordered by item id.
    async fn download_errors(&self, account: &str) -> Result<Vec<DownloadErrorRecord>>;
}

pub struct SqliteFileRecordRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteFileRecordRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_records (
                account TEXT NOT NULL,
                media_item_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (account, media_item_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS download_errors (
                account TEXT NOT NULL,
                media_item_id TEXT NOT NULL,
                message TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (account, media_item_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl FileRecordRepository for SqliteFileRecordRepository {
    async fn save_file_record(&self, account: &str, record: &FileRecord) -> Result<()> {
        let payload =
            serde_json::to_string(record).map_err(|e| BackupError::Data(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO file_records (account, media_item_id, payload)
            VALUES (?, ?, ?)
            ON CONFLICT(account, media_item_id) DO UPDATE SET payload = excluded.payload
            "#,
        )
        .bind(account)
        .bind(&record.media_item.id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_file_record(
        &self,
        account: &str,
        media_item_id: &str,
    ) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT payload FROM file_records WHERE account = ? AND media_item_id = ?",
        )
        .bind(account)
        .bind(media_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        row.map(|row| {
            let payload: String = row.get("payload");
            serde_json::from_str(&payload)
                .map_err(|e| BackupError::Data(format!("file record {media_item_id}: {e}")))
        })
        .transpose()
    }

    async fn save_download_error(
        &self,
        account: &str,
        media_item_id: &str,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO download_errors (account, media_item_id, message, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(account, media_item_id) DO UPDATE SET
                message = excluded.message,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(account)
        .bind(media_item_id)
        .bind(message)
        .bind(self.clock.unix_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }

    async fn download_errors(&self, account: &str) -> Result<Vec<DownloadErrorRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT media_item_id, message, recorded_at FROM download_errors
            WHERE account = ?
            ORDER BY media_item_id ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| DownloadErrorRecord {
                media_item_id: row.get("media_item_id"),
                message: row.get("message"),
                recorded_at: row.get("recorded_at"),
            })
            .collect())
    }
}

/// File system side of the backup tree.
#[derive(Clone)]
pub struct FilesManager {
    records: Arc<dyn FileRecordRepository>,
    fs: Arc<dyn FileSystemAccess>,
}

impl FilesManager {
    pub fn new(records: Arc<dyn FileRecordRepository>, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self { records, fs }
    }

    pub fn records(&self) -> &Arc<dyn FileRecordRepository> {
        &self.records
    }

    pub fn fs(&self) -> &Arc<dyn FileSystemAccess> {
        &self.fs
    }

    /// True when the item's file is on disk *and* recorded under the same path.
    ///
    /// A file without a record, or a record pointing somewhere else, does not
    /// count: the item is treated as new and downloaded again.
    pub async fn file_exists(&self, account: &str, root: &Path, item: &MediaItem) -> Result<bool> {
        let relative = generate_path(account, item)?;

        if !self.fs.exists(&absolute_path(root, &relative)).await? {
            return Ok(false);
        }

        let record = self.records.get_file_record(account, &item.id).await?;
        let recorded_here = record
            .map(|r| r.file_path_name == relative)
            .unwrap_or(false);

        debug!(media_item_id = %item.id, recorded_here, "File found on disk");
        Ok(recorded_here)
    }

    pub async fn hash_file(&self, path: &Path) -> Result<ContentDigest> {
        let mut reader = self.fs.open_read_stream(path).await?;
        hash_reader(&mut reader)
            .await
            .map_err(|e| BackupError::Storage(format!("{}: {}", path.display(), e)))
    }

    /// Stamp the file with the item's creation time.
    pub async fn set_creation_time(&self, path: &Path, item: &MediaItem) -> Result<()> {
        let created = item
            .media_metadata
            .parsed_creation_time()
            .map_err(|_| BackupError::InvalidTimestamp {
                media_item_id: item.id.clone(),
                value: item.media_metadata.creation_time.clone(),
            })?;

        self.fs.set_modified_time(path, created).await?;
        Ok(())
    }
}
