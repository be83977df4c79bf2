//! # Download Queue
//!
//! Durable, per-account set of media item ids waiting to be downloaded.
//!
//! ## Overview
//!
//! The scanner schedules every id it sees; re-scheduling an id that is
//! already queued is a no-op apart from rewriting the same payload. The
//! downloader repeatedly takes the first pending request in ascending id
//! order and deletes it once the item is safely on disk (or has been
//! dropped).
//!
//! Requests are stored as a small JSON payload so additional fields can be
//! added without a schema change.

use crate::{BackupError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// One pending download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub media_item_id: String,
}

impl DownloadRequest {
    pub fn new(media_item_id: impl Into<String>) -> Self {
        Self {
            media_item_id: media_item_id.into(),
        }
    }
}

#[async_trait]
pub trait DownloadScheduler: Send + Sync {
    /// Queue an item for the account. Idempotent.
    async fn schedule_download(&self, account: &str, media_item_id: &str) -> Result<()>;

    /// First pending request in ascending `media_item_id` order.
    async fn get_next(&self, account: &str) -> Result<Option<DownloadRequest>>;

    /// Remove a request. Deleting an absent request succeeds.
    async fn delete(&self, account: &str, media_item_id: &str) -> Result<()>;

    async fn pending_count(&self, account: &str) -> Result<u64>;
}

pub struct SqliteDownloadScheduler {
    pool: SqlitePool,
}

impl SqliteDownloadScheduler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS download_requests (
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

        Ok(())
    }
}

#[async_trait]
impl DownloadScheduler for SqliteDownloadScheduler {
    async fn schedule_download(&self, account: &str, media_item_id: &str) -> Result<()> {
        let payload = serde_json::to_string(&DownloadRequest::new(media_item_id))
            .map_err(|e| BackupError::Data(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO download_requests (account, media_item_id, payload)
            VALUES (?, ?, ?)
            ON CONFLICT(account, media_item_id) DO UPDATE SET payload = excluded.payload
            "#,
        )
        .bind(account)
        .bind(media_item_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_next(&self, account: &str) -> Result<Option<DownloadRequest>> {
        let row = sqlx::query(
            r#"
            SELECT media_item_id, payload FROM download_requests
            WHERE account = ?
            ORDER BY media_item_id ASC
            LIMIT 1
            "#,
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let key: String = row.get("media_item_id");
        let payload: String = row.get("payload");
        let request: DownloadRequest = serde_json::from_str(&payload).map_err(|e| {
            BackupError::Data(format!("download request {key}: {e}"))
        })?;

        if request.media_item_id.is_empty() {
            return Err(BackupError::Data(format!(
                "download request {key} has an empty media item id"
            )));
        }

        Ok(Some(request))
    }

    async fn delete(&self, account: &str, media_item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM download_requests WHERE account = ? AND media_item_id = ?")
            .bind(account)
            .bind(media_item_id)
            .execute(&self.pool)
            .await
            .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }

    async fn pending_count(&self, account: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM download_requests WHERE account = ?")
                .bind(account)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(count.max(0) as u64)
    }
}
