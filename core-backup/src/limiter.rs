//! # Rate Limiter
//!
//! Persistent per-entity, per-category throttle state with exponential
//! backoff.
//!
//! ## Overview
//!
//! Every time the provider answers 429, the `(entity, category)` counter is
//! incremented and a cooldown of `3^count` minutes is stored. Callers ask
//! [`RateLimiter::limit_reached`] before a remote call and skip the work
//! while the cooldown is still running. A successful call resets both the
//! counter and the cooldown, so the next throttle starts again at three
//! minutes.
//!
//! | consecutive throttles | cooldown |
//! |-----------------------|----------|
//! | 1                     | 3 min    |
//! | 2                     | 9 min    |
//! | 3                     | 27 min   |
//!
//! An expired cooldown reports "not limited" without touching the counter;
//! only a success clears it.

use crate::{BackupError, Result};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::events::{BackupEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BASE_COOLDOWN_SECS: i64 = 60;
const BACKOFF_FACTOR: i64 = 3;

/// Kind of remote call a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitCategory {
    /// Catalog listing and item lookups
    PhotosRequest,
    /// Content downloads
    PhotosDownload,
    DriveRequest,
}

impl LimitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitCategory::PhotosRequest => "photos-request",
            LimitCategory::PhotosDownload => "photos-download",
            LimitCategory::DriveRequest => "drive-request",
        }
    }
}

impl fmt::Display for LimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitCategory {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "photos-request" => Ok(LimitCategory::PhotosRequest),
            "photos-download" => Ok(LimitCategory::PhotosDownload),
            "drive-request" => Ok(LimitCategory::DriveRequest),
            other => Err(BackupError::UnknownLimitCategory(other.to_string())),
        }
    }
}

/// Stored throttle state for one `(entity, category)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitRecord {
    /// Consecutive throttles since the last success
    pub count: i64,
    /// Unix seconds; zero means no cooldown
    pub cooldown_until: i64,
}

impl RateLimitRecord {
    /// Whether the cooldown is still running at `now`.
    pub fn is_limited_at(&self, now: i64) -> bool {
        self.cooldown_until != 0 && self.cooldown_until >= now
    }
}

/// Cooldown length in seconds after `count` consecutive throttles.
///
/// Saturates instead of overflowing for absurd counts.
pub fn cooldown_secs(count: i64) -> i64 {
    u32::try_from(count)
        .ok()
        .and_then(|exp| BACKOFF_FACTOR.checked_pow(exp))
        .and_then(|factor| factor.checked_mul(BASE_COOLDOWN_SECS))
        .unwrap_or(i64::MAX)
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// True while a cooldown is running for the pair.
    async fn limit_reached(&self, entity: &str, category: LimitCategory) -> Result<bool>;

    /// Escalate (`true`) or reset (`false`) the pair.
    async fn set_limit_reached(
        &self,
        entity: &str,
        category: LimitCategory,
        reached: bool,
    ) -> Result<()>;

    /// Current stored state, if the pair was ever throttled.
    async fn record(
        &self,
        entity: &str,
        category: LimitCategory,
    ) -> Result<Option<RateLimitRecord>>;
}

pub struct SqliteRateLimiter {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteRateLimiter {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limits (
                entity TEXT NOT NULL,
                category TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                cooldown_until INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (entity, category)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }

    async fn store(
        &self,
        entity: &str,
        category: LimitCategory,
        record: RateLimitRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_limits (entity, category, count, cooldown_until)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(entity, category) DO UPDATE SET
                count = excluded.count,
                cooldown_until = excluded.cooldown_until
            "#,
        )
        .bind(entity)
        .bind(category.as_str())
        .bind(record.count)
        .bind(record.cooldown_until)
        .execute(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl RateLimiter for SqliteRateLimiter {
    async fn limit_reached(&self, entity: &str, category: LimitCategory) -> Result<bool> {
        let now = self.clock.unix_timestamp();
        Ok(self
            .record(entity, category)
            .await?
            .map(|record| record.is_limited_at(now))
            .unwrap_or(false))
    }

    async fn set_limit_reached(
        &self,
        entity: &str,
        category: LimitCategory,
        reached: bool,
    ) -> Result<()> {
        if !reached {
            return self.store(entity, category, RateLimitRecord::default()).await;
        }

        let previous = self.record(entity, category).await?.unwrap_or_default();
        let count = previous.count.saturating_add(1);
        let cooldown_until = self
            .clock
            .unix_timestamp()
            .saturating_add(cooldown_secs(count));

        debug!(category = %category, count, cooldown_until, "Escalating rate limit");
        self.store(
            entity,
            category,
            RateLimitRecord {
                count,
                cooldown_until,
            },
        )
        .await
    }

    async fn record(
        &self,
        entity: &str,
        category: LimitCategory,
    ) -> Result<Option<RateLimitRecord>> {
        let row = sqlx::query(
            "SELECT count, cooldown_until FROM rate_limits WHERE entity = ? AND category = ?",
        )
        .bind(entity)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BackupError::Database(e.to_string()))?;

        Ok(row.map(|row| RateLimitRecord {
            count: row.get("count"),
            cooldown_until: row.get("cooldown_until"),
        }))
    }
}

/// Limiter plus event reporting, shared by the scanner and the downloader.
#[derive(Clone)]
pub(crate) struct LimitTracker {
    limiter: Arc<dyn RateLimiter>,
    events: EventBus,
}

impl LimitTracker {
    pub(crate) fn new(limiter: Arc<dyn RateLimiter>, events: EventBus) -> Self {
        Self { limiter, events }
    }

    pub(crate) async fn is_limited(&self, account: &str, category: LimitCategory) -> Result<bool> {
        let limited = self.limiter.limit_reached(account, category).await?;
        if limited {
            debug!(
                account = %redact_if_sensitive("account", account),
                category = %category,
                "Cooldown running, skipping"
            );
        }
        Ok(limited)
    }

    /// Record a throttle and return the error the caller should surface.
    pub(crate) async fn throttled(&self, account: &str, category: LimitCategory) -> BackupError {
        if let Err(e) = self.limiter.set_limit_reached(account, category, true).await {
            return e;
        }

        let cooldown_until = match self.limiter.record(account, category).await {
            Ok(record) => record.map(|r| r.cooldown_until).unwrap_or_default(),
            Err(e) => return e,
        };

        warn!(
            account = %redact_if_sensitive("account", account),
            category = %category,
            cooldown_until,
            "Provider throttled request"
        );
        self.events.emit_backup(BackupEvent::LimitReached {
            account: account.to_string(),
            category: category.to_string(),
            cooldown_until,
        });

        BackupError::Throttled { category }
    }

    /// Reset the pair after a successful call; a no-op when it was never throttled.
    pub(crate) async fn cleared(&self, account: &str, category: LimitCategory) -> Result<()> {
        let throttled_before = self
            .limiter
            .record(account, category)
            .await?
            .map(|record| record.count > 0 || record.cooldown_until != 0)
            .unwrap_or(false);

        if !throttled_before {
            return Ok(());
        }

        self.limiter
            .set_limit_reached(account, category, false)
            .await?;

        info!(
            account = %redact_if_sensitive("account", account),
            category = %category,
            "Rate limit cleared"
        );
        self.events.emit_backup(BackupEvent::LimitCleared {
            account: account.to_string(),
            category: category.to_string(),
        });
        Ok(())
    }
}
