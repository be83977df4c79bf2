//! # Downloader
//!
//! Drains each account's download queue, a bounded batch per run.
//!
//! ## Overview
//!
//! For every queued id the downloader looks the item up (fresh metadata and
//! a fresh content URL), derives its storage path, streams the content into
//! `{path}.part` while hashing it, and then publishes the file:
//!
//! - new item: the partial file is renamed into place;
//! - already backed up with identical content: the partial file is removed
//!   and the existing file is left untouched;
//! - already backed up with different content: the partial file replaces it.
//!
//! The target's modification time is then set to the item's creation time,
//! the file record is saved and the request leaves the queue.
//!
//! ## Failure handling
//!
//! | failure                          | effect                                         |
//! |----------------------------------|------------------------------------------------|
//! | 429 on lookup                    | request limit escalated, account run ends       |
//! | 429 on content                   | download limit escalated, account run ends      |
//! | other provider failure           | error logged to `download_errors`, request dropped, batch continues |
//! | database / file system failure   | account run ends, request stays queued          |
//!
//! A batch that dropped items still reports the first drop as its error once
//! the rest of the batch is done.

use crate::download_queue::DownloadScheduler;
use crate::fanout::join_accounts;
use crate::files::{absolute_path, generate_path, ContentDigest, FileRecord, FilesManager};
use crate::limiter::{LimitCategory, LimitTracker, RateLimiter};
use crate::settings::BackupSettings;
use crate::{BackupError, Result};
use bridge_traits::catalog::{AccountCatalog, AccountDirectory, ContentStream};
use bridge_traits::error::BridgeError;
use core_runtime::events::{BackupEvent, EventBus, RunId};
use core_runtime::logging::{redact_if_sensitive, strip_path};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Result of one item's download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub record: FileRecord,
    /// The file on disk already had the downloaded content.
    pub skipped_identical: bool,
}

/// Counters for one account's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Items written or replaced
    pub downloaded: u64,
    /// Items whose existing file already matched
    pub skipped_identical: u64,
    /// Items removed from the queue after a provider failure
    pub dropped: u64,
    /// The run ended early because a cooldown is running.
    pub stopped_by_limit: bool,
}

enum ItemFailure {
    Throttled(LimitCategory),
    /// The request is removed and the error recorded.
    Dropped(BackupError),
    /// The request stays queued.
    Fatal(BackupError),
}

impl From<BackupError> for ItemFailure {
    fn from(err: BackupError) -> Self {
        ItemFailure::Fatal(err)
    }
}

impl From<BridgeError> for ItemFailure {
    fn from(err: BridgeError) -> Self {
        ItemFailure::Fatal(err.into())
    }
}

#[derive(Clone)]
pub struct Downloader {
    accounts: Arc<dyn AccountDirectory>,
    limits: LimitTracker,
    queue: Arc<dyn DownloadScheduler>,
    files: FilesManager,
    settings: BackupSettings,
    events: EventBus,
}

impl Downloader {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        limiter: Arc<dyn RateLimiter>,
        queue: Arc<dyn DownloadScheduler>,
        files: FilesManager,
        settings: BackupSettings,
        events: EventBus,
    ) -> Self {
        Self {
            accounts,
            limits: LimitTracker::new(limiter, events.clone()),
            queue,
            files,
            settings,
            events,
        }
    }

    /// Run one batch for every account concurrently.
    ///
    /// Returns the first account error after all accounts have finished.
    #[instrument(skip(self, cancel), fields(run_id = tracing::field::Empty))]
    pub async fn download_all(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        if !self.settings.photos_backup_enabled().await? {
            info!("Photos backup disabled, skipping downloads");
            return Ok(());
        }

        let accounts = self
            .accounts
            .accounts()
            .await
            .map_err(|e| BackupError::Provider(e.to_string()))?;

        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(accounts = accounts.len(), "Starting download run");

        let token = cancel.child_token();
        let mut workers = JoinSet::new();
        for account in accounts {
            let downloader = self.clone();
            let token = token.clone();
            workers.spawn(
                async move {
                    let result = downloader
                        .download_account(&account, run_id, &token)
                        .await
                        .map(|_| ());
                    (account.email, result)
                }
                .in_current_span(),
            );
        }

        join_accounts(workers).await
    }

    /// Download up to the configured batch limit of one account's queue.
    ///
    /// Items dropped after a provider failure do not stop the batch; the
    /// first such error is returned once the batch is over.
    #[instrument(
        skip(self, account, cancel),
        fields(
            account = %redact_if_sensitive("account", &account.email),
            client_id = %account.client_id
        )
    )]
    pub async fn download_account(
        &self,
        account: &AccountCatalog,
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<DownloadSummary> {
        let email = account.email.as_str();
        let root = self.settings.root_path().await?;
        let batch_limit = self.settings.download_batch_limit().await?;
        let mut summary = DownloadSummary::default();
        let mut first_dropped = None;

        for _ in 0..batch_limit {
            if cancel.is_cancelled() {
                debug!("Cancelled between downloads");
                break;
            }

            if self
                .limits
                .is_limited(email, LimitCategory::PhotosRequest)
                .await?
                || self
                    .limits
                    .is_limited(email, LimitCategory::PhotosDownload)
                    .await?
            {
                summary.stopped_by_limit = true;
                break;
            }

            let Some(request) = self.queue.get_next(email).await? else {
                break;
            };
            let media_item_id = request.media_item_id;

            match self.download_item(account, &media_item_id, &root).await {
                Ok(outcome) => {
                    self.files
                        .records()
                        .save_file_record(email, &outcome.record)
                        .await?;
                    self.queue.delete(email, &media_item_id).await?;

                    self.limits
                        .cleared(email, LimitCategory::PhotosRequest)
                        .await?;
                    self.limits
                        .cleared(email, LimitCategory::PhotosDownload)
                        .await?;

                    if outcome.skipped_identical {
                        summary.skipped_identical += 1;
                    } else {
                        summary.downloaded += 1;
                    }

                    debug!(
                        media_item_id = %media_item_id,
                        file = %strip_path(&outcome.record.file_path_name),
                        skipped_identical = outcome.skipped_identical,
                        "Item backed up"
                    );
                    self.events.emit_backup(BackupEvent::ItemDownloaded {
                        run_id,
                        account: email.to_string(),
                        media_item_id: media_item_id.clone(),
                        path: outcome.record.file_path_name,
                        skipped_identical: outcome.skipped_identical,
                    });
                }
                Err(ItemFailure::Throttled(category)) => {
                    return Err(self.limits.throttled(email, category).await);
                }
                Err(ItemFailure::Dropped(err)) => {
                    let reason = err.to_string();
                    warn!(
                        media_item_id = %media_item_id,
                        error = %reason,
                        "Dropping queued item"
                    );

                    self.files
                        .records()
                        .save_download_error(email, &media_item_id, &reason)
                        .await?;
                    self.queue.delete(email, &media_item_id).await?;

                    self.events.emit_backup(BackupEvent::ItemDropped {
                        run_id,
                        account: email.to_string(),
                        media_item_id,
                        reason,
                    });

                    summary.dropped += 1;
                    if first_dropped.is_none() {
                        first_dropped = Some(err);
                    }
                }
                Err(ItemFailure::Fatal(err)) => return Err(err),
            }
        }

        info!(
            downloaded = summary.downloaded,
            skipped_identical = summary.skipped_identical,
            dropped = summary.dropped,
            stopped_by_limit = summary.stopped_by_limit,
            "Download batch finished"
        );

        match first_dropped {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    async fn download_item(
        &self,
        account: &AccountCatalog,
        media_item_id: &str,
        root: &Path,
    ) -> std::result::Result<DownloadOutcome, ItemFailure> {
        let email = account.email.as_str();

        let item = match account.catalog.get_item(media_item_id).await {
            Ok(item) => item,
            Err(e) if e.is_throttled() => {
                return Err(ItemFailure::Throttled(LimitCategory::PhotosRequest))
            }
            Err(e) => return Err(ItemFailure::Dropped(BackupError::Provider(e.to_string()))),
        };

        let relative = generate_path(email, &item).map_err(ItemFailure::Dropped)?;
        let target = absolute_path(root, &relative);
        let already_backed_up = self.files.file_exists(email, root, &item).await?;

        let mut content = match account.catalog.fetch_content(&item).await {
            Ok(content) => content,
            Err(e) if e.is_throttled() => {
                return Err(ItemFailure::Throttled(LimitCategory::PhotosDownload))
            }
            Err(e) => return Err(ItemFailure::Dropped(BackupError::Provider(e.to_string()))),
        };

        let partial = partial_path(&target);
        let remote_digest = match self.write_partial(&mut content, &partial).await {
            Ok(digest) => digest,
            Err(failure) => {
                self.discard(&partial).await;
                return Err(failure);
            }
        };

        let skipped_identical = match self
            .publish(&partial, &target, remote_digest, already_backed_up)
            .await
        {
            Ok(skipped) => skipped,
            Err(e) => {
                self.discard(&partial).await;
                return Err(e.into());
            }
        };

        self.files.set_creation_time(&target, &item).await?;

        Ok(DownloadOutcome {
            record: FileRecord {
                file_path_name: relative,
                media_item: item,
            },
            skipped_identical,
        })
    }

    /// Stream the remote body into `partial`, returning its digest.
    async fn write_partial(
        &self,
        content: &mut ContentStream,
        partial: &Path,
    ) -> std::result::Result<ContentDigest, ItemFailure> {
        let fs = self.files.fs();
        if let Some(parent) = partial.parent() {
            fs.create_dir_all(parent).await?;
        }

        let mut writer = fs.open_write_stream(partial).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_CHUNK_SIZE];

        loop {
            let n = content.read(&mut buf).await.map_err(|e| {
                ItemFailure::Dropped(BackupError::Provider(format!("content stream: {}", e)))
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer
                .write_all(&buf[..n])
                .await
                .map_err(|e| BackupError::Storage(e.to_string()))?;
        }

        writer
            .shutdown()
            .await
            .map_err(|e| BackupError::Storage(e.to_string()))?;

        Ok(hasher.finalize().into())
    }

    /// Move the partial file into place unless the existing file is identical.
    async fn publish(
        &self,
        partial: &Path,
        target: &Path,
        remote_digest: ContentDigest,
        already_backed_up: bool,
    ) -> Result<bool> {
        let fs = self.files.fs();

        if already_backed_up && self.files.hash_file(target).await? == remote_digest {
            fs.delete_file(partial).await?;
            return Ok(true);
        }

        fs.rename(partial, target).await?;
        Ok(false)
    }

    async fn discard(&self, partial: &Path) {
        let fs = self.files.fs();
        if matches!(fs.exists(partial).await, Ok(true)) {
            if let Err(e) = fs.delete_file(partial).await {
                warn!(
                    file = %strip_path(&partial.to_string_lossy()),
                    error = %e,
                    "Failed to remove partial file"
                );
            }
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
