//! Backup service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, file system,
//! settings) and an account directory into the backup core. Desktop hosts
//! enable the `desktop-shims` feature, which supplies `bridge-desktop`
//! defaults for every bridge the host does not inject.
//!
//! ## Usage
//!
//! ```ignore
//! use backup_service::{BackupService, StaticAccountDirectory};
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/media-backup/state.db")
//!     .download_root("/srv/photos")
//!     .build()?;
//!
//! let accounts = Arc::new(StaticAccountDirectory::default());
//! accounts
//!     .add_google_photos("alice@example.com", "client-1", &token, config.require_http_client()?)
//!     .await;
//!
//! let service = BackupService::bootstrap(config, accounts).await?;
//! service.start().await;
//! ```

mod accounts;
pub mod error;

pub use accounts::StaticAccountDirectory;
pub use error::{Result, ServiceError};

use bridge_traits::catalog::AccountDirectory;
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::{Clock, SystemClock};
use core_backup::db::{create_pool, DatabaseConfig};
use core_backup::{
    BackupSettings, DownloadErrorRecord, DownloadScheduler, Downloader, DownloaderJob,
    FileRecordRepository, FilesManager, JobRunner, RescanScheduler, Scanner, ScannerJob,
    SqliteDownloadScheduler, SqliteFileRecordRepository, SqliteRateLimiter,
    SqliteRescanScheduler, PHOTOS_SCOPE,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Primary façade exposed to host applications.
pub struct BackupService {
    pool: SqlitePool,
    events: EventBus,
    settings: BackupSettings,
    queue: Arc<SqliteDownloadScheduler>,
    cursors: Arc<SqliteRescanScheduler>,
    records: Arc<SqliteFileRecordRepository>,
    scanner: Scanner,
    downloader: Downloader,
    runner: Mutex<JobRunner>,
    cancel: CancellationToken,
}

impl BackupService {
    /// Open the database, seed settings and wire every component.
    pub async fn bootstrap(
        config: CoreConfig,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                config.file_system.create_dir_all(parent).await?;
            }
        }

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let settings_store = resolve_settings_store(&config, &pool).await?;
        let settings = BackupSettings::new(settings_store);
        settings.initialize_defaults(&config.download_root).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let events = EventBus::new(config.event_buffer_size);
        let limiter = Arc::new(SqliteRateLimiter::new(pool.clone(), clock.clone()));
        let queue = Arc::new(SqliteDownloadScheduler::new(pool.clone()));
        let cursors = Arc::new(SqliteRescanScheduler::new(pool.clone()));
        let records = Arc::new(SqliteFileRecordRepository::new(pool.clone(), clock));

        let scanner = Scanner::new(
            accounts.clone(),
            limiter.clone(),
            queue.clone(),
            cursors.clone(),
            settings.clone(),
            events.clone(),
        );
        let downloader = Downloader::new(
            accounts,
            limiter,
            queue.clone(),
            FilesManager::new(records.clone(), config.file_system.clone()),
            settings.clone(),
            events.clone(),
        );

        let runner = JobRunner::new(events.clone())
            .with_job(Arc::new(ScannerJob::new(scanner.clone(), settings.clone())))
            .with_job(Arc::new(DownloaderJob::new(
                downloader.clone(),
                settings.clone(),
            )));

        info!(
            database = %config.database_path.display(),
            "Backup service initialized"
        );

        Ok(Self {
            pool,
            events,
            settings,
            queue,
            cursors,
            records,
            scanner,
            downloader,
            runner: Mutex::new(runner),
            cancel: CancellationToken::new(),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    /// Scan every account once, outside the job schedule.
    pub async fn scan_all(&self) -> Result<()> {
        Ok(self.scanner.scan_all(&self.cancel).await?)
    }

    /// Download one batch for every account, outside the job schedule.
    pub async fn download_all(&self) -> Result<()> {
        Ok(self.downloader.download_all(&self.cancel).await?)
    }

    pub async fn schedule_download(&self, account: &str, media_item_id: &str) -> Result<()> {
        Ok(self.queue.schedule_download(account, media_item_id).await?)
    }

    /// Make the next scan of the account start from the first page.
    pub async fn request_rescan(&self, account: &str) -> Result<()> {
        Ok(self.cursors.request_rescan(PHOTOS_SCOPE, account).await?)
    }

    pub async fn pending_downloads(&self, account: &str) -> Result<u64> {
        Ok(self.queue.pending_count(account).await?)
    }

    pub async fn download_errors(&self, account: &str) -> Result<Vec<DownloadErrorRecord>> {
        Ok(self.records.download_errors(account).await?)
    }

    /// Start the recurring scanner and downloader jobs.
    pub async fn start(&self) {
        self.runner.lock().await.start();
    }

    pub async fn is_running(&self) -> bool {
        self.runner.lock().await.is_running()
    }

    /// Stop the jobs, cancel manual runs and close the database.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.runner.lock().await.shutdown().await;
        self.pool.close().await;
    }
}

async fn resolve_settings_store(
    config: &CoreConfig,
    pool: &SqlitePool,
) -> Result<Arc<dyn SettingsStore>> {
    match config.settings_store.clone() {
        Some(store) => Ok(store),
        None => provide_default_settings_store(config, pool).await,
    }
}

/// Keep settings in the backup database itself.
#[cfg(feature = "desktop-shims")]
async fn provide_default_settings_store(
    _config: &CoreConfig,
    pool: &SqlitePool,
) -> Result<Arc<dyn SettingsStore>> {
    let store = bridge_desktop::SqliteSettingsStore::with_pool(pool.clone()).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
async fn provide_default_settings_store(
    config: &CoreConfig,
    _pool: &SqlitePool,
) -> Result<Arc<dyn SettingsStore>> {
    Ok(config.require_settings_store()?)
}
