use crate::limiter::LimitCategory;
use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// The provider answered 429; the cooldown has already been recorded.
    #[error("Provider throttled {category} calls")]
    Throttled { category: LimitCategory },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Malformed stored data: {0}")]
    Data(String),

    #[error("Unknown rate limit category: {0}")]
    UnknownLimitCategory(String),

    #[error("Invalid creation time {value:?} on media item {media_item_id}")]
    InvalidTimestamp {
        media_item_id: String,
        value: String,
    },

    #[error("Account worker failed: {0}")]
    Worker(String),

    #[error("Backup run cancelled")]
    Cancelled,
}

impl BackupError {
    /// Whether waiting out a cooldown and running again can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

impl From<BridgeError> for BackupError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::DatabaseError(msg) => Self::Database(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
