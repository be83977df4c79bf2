//! Scheduled units of work driven by the [`JobRunner`](crate::runner::JobRunner).

use crate::downloader::Downloader;
use crate::scanner::Scanner;
use crate::settings::BackupSettings;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Job: Send + Sync {
    /// Stable name used in logs and `JobFailed` events.
    fn name(&self) -> &str;

    async fn run(&self, cancel: &CancellationToken) -> Result<()>;

    /// Pause after each run. Read fresh before every iteration.
    async fn delay(&self) -> Duration;
}

pub struct ScannerJob {
    scanner: Scanner,
    settings: BackupSettings,
}

impl ScannerJob {
    pub const NAME: &'static str = "scanner";

    pub fn new(scanner: Scanner, settings: BackupSettings) -> Self {
        Self { scanner, settings }
    }
}

#[async_trait]
impl Job for ScannerJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.scanner.scan_all(cancel).await
    }

    async fn delay(&self) -> Duration {
        self.settings.scanner_job_delay().await
    }
}

pub struct DownloaderJob {
    downloader: Downloader,
    settings: BackupSettings,
}

impl DownloaderJob {
    pub const NAME: &'static str = "downloader";

    pub fn new(downloader: Downloader, settings: BackupSettings) -> Self {
        Self {
            downloader,
            settings,
        }
    }
}

#[async_trait]
impl Job for DownloaderJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.downloader.download_all(cancel).await
    }

    async fn delay(&self) -> Duration {
        self.settings.downloader_job_delay().await
    }
}
