//! # Backup Core
//!
//! Incremental backup of remote media libraries to a local directory tree.
//!
//! ## Overview
//!
//! Two recurring jobs cooperate through persistent state:
//!
//! - the **scanner** pages through each account's catalog and queues every
//!   item id it sees;
//! - the **downloader** drains the queue in bounded batches, writing each
//!   item under `{account}/{year}/{month}/{filename}` and recording it.
//!
//! Both respect a per-account, per-category **rate limiter** with
//! exponential backoff, so a throttled account backs off without affecting
//! the others.
//!
//! ## Components
//!
//! - **Rate Limiter** (`limiter`): throttle counters and cooldowns
//! - **Download Queue** (`download_queue`): idempotent per-account work queue
//! - **Rescan Cursors** (`rescan`): where each catalog walk resumes
//! - **File Records** (`files`): storage paths, dedup checks, error log
//! - **Scanner** (`scanner`) and **Downloader** (`downloader`)
//! - **Job Runner** (`runner`): runs the jobs on their configured delays
//! - **Settings** (`settings`) and **Database** (`db`)

pub mod db;
pub mod download_queue;
pub mod downloader;
pub mod error;
mod fanout;
pub mod files;
pub mod job;
pub mod limiter;
pub mod rescan;
pub mod runner;
pub mod scanner;
pub mod settings;

pub use error::{BackupError, Result};
pub use download_queue::{DownloadRequest, DownloadScheduler, SqliteDownloadScheduler};
pub use downloader::{DownloadOutcome, DownloadSummary, Downloader};
pub use files::{
    DownloadErrorRecord, FileRecord, FileRecordRepository, FilesManager,
    SqliteFileRecordRepository,
};
pub use job::{DownloaderJob, Job, ScannerJob};
pub use limiter::{LimitCategory, RateLimitRecord, RateLimiter, SqliteRateLimiter};
pub use rescan::{RescanRequest, RescanScheduler, SqliteRescanScheduler, PHOTOS_SCOPE};
pub use runner::JobRunner;
pub use scanner::{ScanOutcome, Scanner};
pub use settings::BackupSettings;
