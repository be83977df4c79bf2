//! Remote Media Catalog Abstractions
//!
//! Contracts for the paginated item catalog a backup reads from, and for the
//! directory that hands out one authenticated catalog per account.
//!
//! ## Overview
//!
//! - [`MediaCatalog`] lists items page by page, resolves a single item and
//!   opens its content as a byte stream.
//! - [`AccountDirectory`] enumerates known accounts together with a catalog
//!   already bound to that account's credentials.
//!
//! Failures are reported as [`CatalogError`] so callers can tell throttling
//! apart from other provider failures with a plain `match`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::error::{CatalogError, CatalogResult, Result};

/// Content of a media item, read incrementally.
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Snapshot of a remote media item.
///
/// Field names follow the provider's JSON so the snapshot can be stored as-is
/// alongside the downloaded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaItem {
    pub id: String,
    pub description: String,
    pub product_url: String,
    /// Base URL for content; only valid for a limited time after lookup
    pub base_url: String,
    pub mime_type: String,
    pub filename: String,
    pub media_metadata: MediaMetadata,
    pub contributor_info: ContributorInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaMetadata {
    /// RFC 3339 timestamp of when the item was originally created
    pub creation_time: String,
    pub width: String,
    pub height: String,
    pub photo: PhotoMetadata,
    pub video: VideoMetadata,
}

impl MediaMetadata {
    /// Parse `creation_time` into UTC.
    pub fn parsed_creation_time(&self) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.creation_time).map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoMetadata {
    pub camera_make: String,
    pub camera_model: String,
    pub focal_length: f64,
    pub aperture_f_number: f64,
    pub iso_equivalent: i64,
    pub exposure_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoMetadata {
    pub camera_make: String,
    pub camera_model: String,
    pub fps: f64,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContributorInfo {
    pub profile_picture_base_url: String,
    pub display_name: String,
}

/// One page of catalog results.
///
/// An empty `next_page_token` means the end of the catalog was reached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaItemsPage {
    pub items: Vec<MediaItem>,
    pub next_page_token: String,
}

impl MediaItemsPage {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_empty()
    }
}

/// Paginated remote catalog bound to a single account.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::MediaCatalog;
///
/// async fn first_page(catalog: &dyn MediaCatalog) -> CatalogResult<usize> {
///     let page = catalog.list_items("").await?;
///     Ok(page.items.len())
/// }
/// ```
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// List one page of items. An empty token starts from the beginning.
    async fn list_items(&self, page_token: &str) -> CatalogResult<MediaItemsPage>;

    /// Resolve full metadata for one item, including a fresh content URL.
    async fn get_item(&self, media_item_id: &str) -> CatalogResult<MediaItem>;

    /// Open the original content of an item.
    ///
    /// A throttling response must surface as [`CatalogError::Throttled`]
    /// before any bytes are handed out.
    async fn fetch_content(&self, item: &MediaItem) -> CatalogResult<ContentStream>;
}

/// An account together with its authenticated catalog.
#[derive(Clone)]
pub struct AccountCatalog {
    /// Account identifier (e-mail address)
    pub email: String,
    /// OAuth client the account is registered under
    pub client_id: String,
    pub catalog: Arc<dyn MediaCatalog>,
}

impl AccountCatalog {
    pub fn new(
        email: impl Into<String>,
        client_id: impl Into<String>,
        catalog: Arc<dyn MediaCatalog>,
    ) -> Self {
        Self {
            email: email.into(),
            client_id: client_id.into(),
            catalog,
        }
    }
}

impl fmt::Debug for AccountCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCatalog")
            .field("email", &self.email)
            .field("client_id", &self.client_id)
            .field("catalog", &"MediaCatalog { ... }")
            .finish()
    }
}

/// Source of the accounts to back up.
///
/// Implementations own credential handling; the core only sees ready-to-use
/// catalogs.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn accounts(&self) -> Result<Vec<AccountCatalog>>;
}

impl From<chrono::ParseError> for CatalogError {
    fn from(err: chrono::ParseError) -> Self {
        CatalogError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_deserialize_media_item() {
        let json = r#"{
            "id": "item-1",
            "productUrl": "https://photos.google.com/lr/photo/item-1",
            "baseUrl": "https://lh3.googleusercontent.com/abc",
            "mimeType": "image/jpeg",
            "filename": "IMG_0001.JPG",
            "mediaMetadata": {
                "creationTime": "2021-03-04T10:20:30Z",
                "width": "4032",
                "height": "3024",
                "photo": {
                    "cameraMake": "Apple",
                    "cameraModel": "iPhone 12",
                    "focalLength": 4.2,
                    "apertureFNumber": 1.6,
                    "isoEquivalent": 32
                }
            }
        }"#;

        let item: MediaItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "item-1");
        assert_eq!(item.filename, "IMG_0001.JPG");
        assert_eq!(item.description, "");
        assert_eq!(item.media_metadata.photo.camera_make, "Apple");
        assert_eq!(item.media_metadata.photo.iso_equivalent, 32);
        assert_eq!(item.media_metadata.video, VideoMetadata::default());

        let created = item.media_metadata.parsed_creation_time().unwrap();
        assert_eq!(created.year(), 2021);
        assert_eq!(created.month(), 3);
    }

    #[test]
    fn test_serialize_uses_provider_field_names() {
        let item = MediaItem {
            id: "item-2".to_string(),
            base_url: "https://example.com/b".to_string(),
            ..MediaItem::default()
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["baseUrl"], "https://example.com/b");
        assert!(value["mediaMetadata"]["creationTime"].is_string());
    }

    #[test]
    fn test_invalid_creation_time() {
        let metadata = MediaMetadata {
            creation_time: "yesterday".to_string(),
            ..MediaMetadata::default()
        };
        let err: CatalogError = metadata.parsed_creation_time().unwrap_err().into();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn test_page_is_last() {
        assert!(MediaItemsPage::default().is_last());
        let page = MediaItemsPage {
            items: vec![],
            next_page_token: "t1".to_string(),
        };
        assert!(!page.is_last());
    }
}
