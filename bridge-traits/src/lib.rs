//! # Host Bridge Traits
//!
//! Abstraction traits for everything the backup core consumes but does not own.
//!
//! ## Overview
//!
//! This crate defines the contract between the backup core and its
//! collaborators. Each trait represents a capability the core requires but
//! that is implemented elsewhere (desktop adapters, remote providers, tests).
//!
//! ## Traits
//!
//! ### Remote catalog
//! - [`MediaCatalog`](catalog::MediaCatalog) - Paginated listing, item lookup and content fetch
//! - [`AccountDirectory`](catalog::AccountDirectory) - Accounts with authenticated catalogs
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Buffered and streaming HTTP with retry on server errors
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for the backup tree
//! - [`SettingsStore`](storage::SettingsStore) - Key-value settings storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! Infrastructure failures use [`BridgeError`](error::BridgeError). Catalog
//! operations return [`CatalogError`](error::CatalogError), which keeps
//! throttling as its own variant so callers can react to it with a `match`.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod catalog;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::{BridgeError, CatalogError};

// Re-export commonly used types
pub use catalog::{
    AccountCatalog, AccountDirectory, ContentStream, MediaCatalog, MediaItem, MediaItemsPage,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse};
pub use storage::{FileMetadata, FileSystemAccess, SettingsStore};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
