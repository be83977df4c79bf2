//! Shared fixtures for the backup integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::catalog::{
    AccountCatalog, AccountDirectory, ContentStream, MediaCatalog, MediaItem, MediaItemsPage,
};
use bridge_traits::error::{CatalogError, CatalogResult, Result as BridgeResult};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::ManualClock;
use core_backup::db::create_test_pool;
use core_backup::files::absolute_path;
use core_backup::{
    BackupSettings, Downloader, FilesManager, RescanScheduler, Scanner,
    SqliteDownloadScheduler, SqliteFileRecordRepository, SqliteRateLimiter,
    SqliteRescanScheduler,
};
use core_runtime::events::EventBus;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const START: i64 = 1_700_000_000;

#[derive(Default)]
struct CatalogState {
    pages: HashMap<String, MediaItemsPage>,
    items: HashMap<String, MediaItem>,
    content: HashMap<String, Vec<u8>>,
    throttle_listing: bool,
    throttle_lookup: bool,
    throttle_content: bool,
    broken_items: HashSet<String>,
    list_calls: Vec<String>,
    lookup_calls: usize,
}

/// In-memory catalog with scriptable failures.
#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<CatalogState>,
}

pub fn media_item(id: &str, filename: &str, created: &str) -> MediaItem {
    let mut item = MediaItem {
        id: id.to_string(),
        filename: filename.to_string(),
        base_url: format!("https://photos.example/{id}"),
        mime_type: "image/jpeg".to_string(),
        ..Default::default()
    };
    item.media_metadata.creation_time = created.to_string();
    item
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a page served for `token`.
    pub async fn add_page(&self, token: &str, ids: &[&str], next_page_token: &str) {
        let mut state = self.state.lock().await;
        let items = ids
            .iter()
            .map(|id| {
                state
                    .items
                    .get(*id)
                    .cloned()
                    .unwrap_or_else(|| media_item(id, &format!("{id}.jpg"), "2020-01-01T00:00:00Z"))
            })
            .collect();
        state.pages.insert(
            token.to_string(),
            MediaItemsPage {
                items,
                next_page_token: next_page_token.to_string(),
            },
        );
    }

    pub async fn add_item(&self, item: MediaItem, content: &[u8]) {
        let mut state = self.state.lock().await;
        state.content.insert(item.id.clone(), content.to_vec());
        state.items.insert(item.id.clone(), item);
    }

    pub async fn set_content(&self, id: &str, content: &[u8]) {
        self.state
            .lock()
            .await
            .content
            .insert(id.to_string(), content.to_vec());
    }

    pub async fn throttle_listing(&self, on: bool) {
        self.state.lock().await.throttle_listing = on;
    }

    pub async fn throttle_lookup(&self, on: bool) {
        self.state.lock().await.throttle_lookup = on;
    }

    pub async fn throttle_content(&self, on: bool) {
        self.state.lock().await.throttle_content = on;
    }

    pub async fn break_item(&self, id: &str) {
        self.state.lock().await.broken_items.insert(id.to_string());
    }

    pub async fn list_calls(&self) -> Vec<String> {
        self.state.lock().await.list_calls.clone()
    }

    pub async fn lookup_calls(&self) -> usize {
        self.state.lock().await.lookup_calls
    }
}

#[async_trait]
impl MediaCatalog for FakeCatalog {
    async fn list_items(&self, page_token: &str) -> CatalogResult<MediaItemsPage> {
        let mut state = self.state.lock().await;
        state.list_calls.push(page_token.to_string());

        if state.throttle_listing {
            return Err(CatalogError::Throttled);
        }

        state
            .pages
            .get(page_token)
            .cloned()
            .ok_or_else(|| CatalogError::Status {
                status: 400,
                message: format!("unknown page token {page_token:?}"),
            })
    }

    async fn get_item(&self, media_item_id: &str) -> CatalogResult<MediaItem> {
        let mut state = self.state.lock().await;
        state.lookup_calls += 1;

        if state.throttle_lookup {
            return Err(CatalogError::Throttled);
        }
        if state.broken_items.contains(media_item_id) {
            return Err(CatalogError::Status {
                status: 500,
                message: "backend error".to_string(),
            });
        }

        state
            .items
            .get(media_item_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(media_item_id.to_string()))
    }

    async fn fetch_content(&self, item: &MediaItem) -> CatalogResult<ContentStream> {
        let state = self.state.lock().await;

        if state.throttle_content {
            return Err(CatalogError::Throttled);
        }

        let bytes = state
            .content
            .get(&item.id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(item.id.clone()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

pub struct StaticDirectory(pub Vec<AccountCatalog>);

#[async_trait]
impl AccountDirectory for StaticDirectory {
    async fn accounts(&self) -> BridgeResult<Vec<AccountCatalog>> {
        Ok(self.0.clone())
    }
}

pub fn account(email: &str, catalog: Arc<FakeCatalog>) -> AccountCatalog {
    AccountCatalog::new(email, "test-client", catalog)
}

/// Every store wired to one in-memory database and a temp download root.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub root: TempDir,
    pub events: EventBus,
    pub limiter: Arc<SqliteRateLimiter>,
    pub queue: Arc<SqliteDownloadScheduler>,
    pub cursors: Arc<SqliteRescanScheduler>,
    pub records: Arc<SqliteFileRecordRepository>,
    pub fs: Arc<TokioFileSystem>,
    pub settings: BackupSettings,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.unwrap();
        let clock = Arc::new(ManualClock::at_unix(START));
        let root = tempfile::tempdir().unwrap();
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        let settings = BackupSettings::new(Arc::new(store));
        settings.initialize_defaults(root.path()).await.unwrap();

        Self {
            limiter: Arc::new(SqliteRateLimiter::new(pool.clone(), clock.clone())),
            queue: Arc::new(SqliteDownloadScheduler::new(pool.clone())),
            cursors: Arc::new(SqliteRescanScheduler::new(pool.clone())),
            records: Arc::new(SqliteFileRecordRepository::new(pool, clock.clone())),
            fs: Arc::new(TokioFileSystem::new()),
            events: EventBus::new(256),
            clock,
            root,
            settings,
        }
    }

    pub fn scanner(&self, accounts: Vec<AccountCatalog>) -> Scanner {
        self.scanner_with_cursors(accounts, self.cursors.clone())
    }

    /// Scanner over a caller-supplied cursor store.
    pub fn scanner_with_cursors(
        &self,
        accounts: Vec<AccountCatalog>,
        cursors: Arc<dyn RescanScheduler>,
    ) -> Scanner {
        Scanner::new(
            Arc::new(StaticDirectory(accounts)),
            self.limiter.clone(),
            self.queue.clone(),
            cursors,
            self.settings.clone(),
            self.events.clone(),
        )
    }

    pub fn downloader(&self, accounts: Vec<AccountCatalog>) -> Downloader {
        let fs: Arc<dyn FileSystemAccess> = self.fs.clone();
        Downloader::new(
            Arc::new(StaticDirectory(accounts)),
            self.limiter.clone(),
            self.queue.clone(),
            FilesManager::new(self.records.clone(), fs),
            self.settings.clone(),
            self.events.clone(),
        )
    }

    pub fn file(&self, relative: &str) -> PathBuf {
        absolute_path(self.root.path(), relative)
    }
}
