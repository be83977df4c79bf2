//! # Backup Settings
//!
//! Typed view over the runtime-mutable settings the jobs read on every
//! iteration.
//!
//! Defaults are written once, on first start; later starts leave whatever
//! the user changed alone. Reads fall back to the defaults when a key is
//! missing, and the job delays also fall back when the stored value is
//! unreadable so a bad edit cannot stop the runner.

use crate::{BackupError, Result};
use bridge_traits::storage::SettingsStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod keys {
    pub const ROOT_PATH: &str = "backup.root_path";
    pub const SCANNER_JOB_DELAY_SECS: &str = "backup.scanner_job_delay_secs";
    pub const DOWNLOADER_JOB_DELAY_SECS: &str = "backup.downloader_job_delay_secs";
    pub const DOWNLOAD_BATCH_LIMIT: &str = "backup.download_batch_limit";
    pub const PHOTOS_BACKUP_ENABLED: &str = "backup.photos_backup_enabled";
    pub const DRIVE_BACKUP_ENABLED: &str = "backup.drive_backup_enabled";
}

pub const DEFAULT_JOB_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_DOWNLOAD_BATCH_LIMIT: usize = 50;

#[derive(Clone)]
pub struct BackupSettings {
    store: Arc<dyn SettingsStore>,
}

impl BackupSettings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Write every default that is not stored yet.
    pub async fn initialize_defaults(&self, download_root: &Path) -> Result<()> {
        let mut written = 0;

        if !self.store.has_key(keys::ROOT_PATH).await? {
            self.store
                .set_string(keys::ROOT_PATH, &download_root.to_string_lossy())
                .await?;
            written += 1;
        }

        for key in [keys::SCANNER_JOB_DELAY_SECS, keys::DOWNLOADER_JOB_DELAY_SECS] {
            if !self.store.has_key(key).await? {
                self.store
                    .set_i64(key, DEFAULT_JOB_DELAY.as_secs() as i64)
                    .await?;
                written += 1;
            }
        }

        if !self.store.has_key(keys::DOWNLOAD_BATCH_LIMIT).await? {
            self.store
                .set_i64(keys::DOWNLOAD_BATCH_LIMIT, DEFAULT_DOWNLOAD_BATCH_LIMIT as i64)
                .await?;
            written += 1;
        }

        for key in [keys::PHOTOS_BACKUP_ENABLED, keys::DRIVE_BACKUP_ENABLED] {
            if !self.store.has_key(key).await? {
                self.store.set_bool(key, true).await?;
                written += 1;
            }
        }

        if written > 0 {
            info!(written, "Initialized default backup settings");
        }
        Ok(())
    }

    /// Root of the backup tree.
    pub async fn root_path(&self) -> Result<PathBuf> {
        match self.store.get_string(keys::ROOT_PATH).await? {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(BackupError::Data(format!(
                "{} is not set",
                keys::ROOT_PATH
            ))),
        }
    }

    pub async fn set_root_path(&self, path: &Path) -> Result<()> {
        self.store
            .set_string(keys::ROOT_PATH, &path.to_string_lossy())
            .await?;
        Ok(())
    }

    pub async fn scanner_job_delay(&self) -> Duration {
        self.job_delay(keys::SCANNER_JOB_DELAY_SECS).await
    }

    pub async fn downloader_job_delay(&self) -> Duration {
        self.job_delay(keys::DOWNLOADER_JOB_DELAY_SECS).await
    }

    pub async fn set_scanner_job_delay(&self, delay: Duration) -> Result<()> {
        self.store
            .set_i64(keys::SCANNER_JOB_DELAY_SECS, delay.as_secs() as i64)
            .await?;
        Ok(())
    }

    pub async fn set_downloader_job_delay(&self, delay: Duration) -> Result<()> {
        self.store
            .set_i64(keys::DOWNLOADER_JOB_DELAY_SECS, delay.as_secs() as i64)
            .await?;
        Ok(())
    }

    async fn job_delay(&self, key: &str) -> Duration {
        match self.store.get_i64(key).await {
            Ok(Some(secs)) if secs >= 0 => Duration::from_secs(secs as u64),
            Ok(Some(secs)) => {
                warn!(key, secs, "Negative job delay, using default");
                DEFAULT_JOB_DELAY
            }
            Ok(None) => DEFAULT_JOB_DELAY,
            Err(e) => {
                warn!(key, error = %e, "Unreadable job delay, using default");
                DEFAULT_JOB_DELAY
            }
        }
    }

    /// Maximum downloads per account per run.
    pub async fn download_batch_limit(&self) -> Result<usize> {
        match self.store.get_i64(keys::DOWNLOAD_BATCH_LIMIT).await? {
            Some(limit) if limit > 0 => Ok(limit as usize),
            Some(limit) => Err(BackupError::Data(format!(
                "{} must be positive, got {}",
                keys::DOWNLOAD_BATCH_LIMIT,
                limit
            ))),
            None => Ok(DEFAULT_DOWNLOAD_BATCH_LIMIT),
        }
    }

    pub async fn set_download_batch_limit(&self, limit: usize) -> Result<()> {
        self.store
            .set_i64(keys::DOWNLOAD_BATCH_LIMIT, limit as i64)
            .await?;
        Ok(())
    }

    pub async fn photos_backup_enabled(&self) -> Result<bool> {
        Ok(self
            .store
            .get_bool(keys::PHOTOS_BACKUP_ENABLED)
            .await?
            .unwrap_or(true))
    }

    pub async fn set_photos_backup_enabled(&self, enabled: bool) -> Result<()> {
        self.store
            .set_bool(keys::PHOTOS_BACKUP_ENABLED, enabled)
            .await?;
        Ok(())
    }

    pub async fn drive_backup_enabled(&self) -> Result<bool> {
        Ok(self
            .store
            .get_bool(keys::DRIVE_BACKUP_ENABLED)
            .await?
            .unwrap_or(true))
    }
}
