//! Error types for the Google Photos provider

use bridge_traits::error::{BridgeError, CatalogError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GooglePhotosError {
    /// HTTP 429
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Media item not found: {media_item_id}")]
    MediaItemNotFound { media_item_id: String },

    #[error("Google Photos API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, GooglePhotosError>;

impl From<GooglePhotosError> for CatalogError {
    fn from(error: GooglePhotosError) -> Self {
        match error {
            GooglePhotosError::RateLimitExceeded => CatalogError::Throttled,
            GooglePhotosError::MediaItemNotFound { media_item_id } => {
                CatalogError::NotFound(media_item_id)
            }
            GooglePhotosError::ApiError {
                status_code,
                message,
            } => CatalogError::Status {
                status: status_code,
                message,
            },
            GooglePhotosError::ParseError(msg) => CatalogError::Parse(msg),
            GooglePhotosError::BridgeError(e) => CatalogError::Bridge(e),
        }
    }
}
