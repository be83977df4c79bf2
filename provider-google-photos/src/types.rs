//! Google Photos Library API response types

use bridge_traits::catalog::{MediaItem, MediaItemsPage};
use serde::Deserialize;

/// `mediaItems.list` response
///
/// Both fields are omitted by the API when empty.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaItemsListResponse {
    pub media_items: Vec<MediaItem>,
    pub next_page_token: String,
}

impl From<MediaItemsListResponse> for MediaItemsPage {
    fn from(response: MediaItemsListResponse) -> Self {
        MediaItemsPage {
            items: response.media_items,
            next_page_token: response.next_page_token,
        }
    }
}
