//! # Rescan Cursors
//!
//! Remembers where each account's catalog scan left off.
//!
//! A cursor holds the page token to request next. An empty token means "start
//! from the beginning", which is also what [`RescanScheduler::request_rescan`]
//! stores. No cursor at all is treated the same way; the scanner deletes the
//! cursor once the end of the catalog has been reached.

use crate::{BackupError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Scope for Google Photos library scans.
pub const PHOTOS_SCOPE: &str = "photos";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescanRequest {
    pub next_page_token: String,
}

impl RescanRequest {
    pub fn at(next_page_token: impl Into<String>) -> Self {
        Self {
            next_page_token: next_page_token.into(),
        }
    }
}

#[async_trait]
pub trait RescanScheduler: Send + Sync {
    async fn get_cursor(&self, scope: &str, account: &str) -> Result<Option<RescanRequest>>;

    async fn save_cursor(&self, scope: &str, account: &str, cursor: &RescanRequest) -> Result<()>;

    async fn delete_cursor(&self, scope: &str, account: &str) -> Result<()>;

    /// Make the next scan start over from the first page.
    async fn request_rescan(&self, scope: &str, account: &str) -> Result<()> {
        self.save_cursor(scope, account, &RescanRequest::default())
            .await
    }
}

pub struct SqliteRescanScheduler {
    pool: SqlitePool,
}

impl SqliteRescanScheduler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rescan_requests (
                scope TEXT NOT NULL,
                account TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (scope, account)
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
impl RescanScheduler for SqliteRescanScheduler {
    async fn get_cursor(&self, scope: &str, account: &str) -> Result<Option<RescanRequest>> {
        let row = sqlx::query("SELECT payload FROM rescan_requests WHERE scope = ? AND account = ?")
            .bind(scope)
            .bind(account)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BackupError::Database(e.to_string()))?;

        row.map(|row| {
            let payload: String = row.get("payload");
            serde_json::from_str(&payload)
                .map_err(|e| BackupError::Data(format!("{scope} cursor: {e}")))
        })
        .transpose()
    }

    async fn save_cursor(&self, scope: &str, account: &str, cursor: &RescanRequest) -> Result<()> {
        let payload =
            serde_json::to_string(cursor).map_err(|e| BackupError::Data(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO rescan_requests (scope, account, payload)
            VALUES (?, ?, ?)
            ON CONFLICT(scope, account) DO UPDATE SET payload = excluded.payload
            "#,
        )
        .bind(scope)
        .bind(account)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }

    async fn delete_cursor(&self, scope: &str, account: &str) -> Result<()> {
        sqlx::query("DELETE FROM rescan_requests WHERE scope = ? AND account = ?")
            .bind(scope)
            .bind(account)
            .execute(&self.pool)
            .await
            .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }
}
