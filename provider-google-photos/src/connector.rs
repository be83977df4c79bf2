//! Google Photos Library API connector
//!
//! Implements `MediaCatalog` on top of an injected `HttpClient`.

use async_trait::async_trait;
use bridge_traits::catalog::{ContentStream, MediaCatalog, MediaItem, MediaItemsPage};
use bridge_traits::error::CatalogResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{GooglePhotosError, Result};
use crate::types::MediaItemsListResponse;

/// Google Photos Library API base URL
const PHOTOS_API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

/// Items per listing page
const PAGE_SIZE: u32 = 100;

/// Suffix on `baseUrl` that requests the original bytes
const DOWNLOAD_ORIGINAL_SUFFIX: &str = "=d";

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Photos Library API connector
///
/// One connector serves one account; the access token must carry the
/// `photoslibrary.readonly` scope.
///
/// # Example
///
/// ```ignore
/// use provider_google_photos::GooglePhotosConnector;
/// use bridge_traits::catalog::MediaCatalog;
///
/// let connector = GooglePhotosConnector::new(http_client, access_token);
/// let page = connector.list_items("").await?;
/// ```
pub struct GooglePhotosConnector {
    http_client: Arc<dyn HttpClient>,
    access_token: String,
    api_base: String,
}

impl GooglePhotosConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            api_base: PHOTOS_API_BASE.to_string(),
        }
    }

    /// Point the connector at another API root (proxies, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn list_url(&self, page_token: &str) -> String {
        format!(
            "{}/mediaItems?pageSize={}&pageToken={}",
            self.api_base,
            PAGE_SIZE,
            urlencoding::encode(page_token)
        )
    }

    fn item_url(&self, media_item_id: &str) -> String {
        format!(
            "{}/mediaItems/{}",
            self.api_base,
            urlencoding::encode(media_item_id)
        )
    }

    fn api_request(&self, url: String) -> HttpRequest {
        HttpRequest::get(url)
            .bearer_token(&self.access_token)
            .header("Accept", "application/json")
            .timeout(API_TIMEOUT)
    }

    /// Map a non-success status to the provider error.
    fn status_error(status: u16, body: String, media_item_id: Option<&str>) -> GooglePhotosError {
        match (status, media_item_id) {
            (429, _) => GooglePhotosError::RateLimitExceeded,
            (404, Some(id)) => GooglePhotosError::MediaItemNotFound {
                media_item_id: id.to_string(),
            },
            _ => GooglePhotosError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        media_item_id: Option<&str>,
    ) -> Result<T> {
        let response: HttpResponse = self.http_client.execute(self.api_request(url)).await?;

        if !response.is_success() {
            warn!(status = response.status, "Google Photos API request failed");
            return Err(Self::status_error(
                response.status,
                response.text_lossy(),
                media_item_id,
            ));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| GooglePhotosError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl MediaCatalog for GooglePhotosConnector {
    #[instrument(skip(self), fields(first_page = page_token.is_empty()))]
    async fn list_items(&self, page_token: &str) -> CatalogResult<MediaItemsPage> {
        let response: MediaItemsListResponse =
            self.get_json(self.list_url(page_token), None).await?;

        debug!(
            items = response.media_items.len(),
            has_more = !response.next_page_token.is_empty(),
            "Listed media items"
        );
        Ok(response.into())
    }

    #[instrument(skip(self))]
    async fn get_item(&self, media_item_id: &str) -> CatalogResult<MediaItem> {
        let item = self
            .get_json(self.item_url(media_item_id), Some(media_item_id))
            .await?;
        Ok(item)
    }

    #[instrument(skip(self, item), fields(media_item_id = %item.id))]
    async fn fetch_content(&self, item: &MediaItem) -> CatalogResult<ContentStream> {
        if item.base_url.is_empty() {
            return Err(GooglePhotosError::ParseError(format!(
                "media item {} has no base URL",
                item.id
            ))
            .into());
        }

        let request = HttpRequest::get(format!("{}{}", item.base_url, DOWNLOAD_ORIGINAL_SUFFIX))
            .bearer_token(&self.access_token);

        let response = self
            .http_client
            .execute_stream(request)
            .await
            .map_err(GooglePhotosError::from)?;

        if !response.is_success() {
            warn!(status = response.status, "Content download refused");
            return Err(Self::status_error(response.status, String::new(), None).into());
        }

        Ok(response.body)
    }
}
