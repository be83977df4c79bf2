use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Classified failure returned by a [`MediaCatalog`](crate::catalog::MediaCatalog).
///
/// Callers branch on the variant; throttling drives rate-limit state while
/// every other kind is treated as a provider failure.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The provider asked us to slow down (HTTP 429).
    #[error("Provider throttled the request")]
    Throttled,

    #[error("Media item not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl CatalogError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled)
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
