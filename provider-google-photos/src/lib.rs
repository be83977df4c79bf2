//! # Google Photos Provider
//!
//! Implements `MediaCatalog` for the Google Photos Library API.
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated listing of an account's media items
//! - Item lookup, which also refreshes the short-lived content URL
//! - Streaming download of original-quality content
//! - Classification of HTTP 429 as throttling so the backup core can back off
//!
//! Obtaining the OAuth access token is the caller's business; the connector
//! only attaches it to every request.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GooglePhotosConnector;
pub use error::{GooglePhotosError, Result};
