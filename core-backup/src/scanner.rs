//! # Scanner
//!
//! Walks each account's remote catalog one page per run and feeds the item
//! ids into the download queue.
//!
//! ## Overview
//!
//! Per account, a run:
//!
//! 1. skips the account while its request cooldown is running;
//! 2. loads the saved cursor (missing means "from the start");
//! 3. fetches one page;
//! 4. schedules every item on it;
//! 5. advances the cursor, or deletes it when the catalog end was reached.
//!
//! The cursor is only written after all items of the page are queued, so a
//! crash in between re-reads the same page and the idempotent queue absorbs
//! the duplicates.
//!
//! A 429 escalates the account's request limit and ends that account's run
//! with [`BackupError::Throttled`]; any successful listing resets it.

use crate::download_queue::DownloadScheduler;
use crate::fanout::join_accounts;
use crate::limiter::{LimitCategory, LimitTracker, RateLimiter};
use crate::rescan::{RescanRequest, RescanScheduler, PHOTOS_SCOPE};
use crate::settings::BackupSettings;
use crate::{BackupError, Result};
use bridge_traits::catalog::{AccountCatalog, AccountDirectory};
use core_runtime::events::{BackupEvent, EventBus, RunId};
use core_runtime::logging::redact_if_sensitive;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, Instrument};

/// What one account's scan did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Cooldown running; nothing was fetched.
    Limited,
    /// Shutdown requested before the listing call.
    Cancelled,
    Scanned {
        items_queued: u64,
        reached_end: bool,
    },
}

#[derive(Clone)]
pub struct Scanner {
    accounts: Arc<dyn AccountDirectory>,
    limits: LimitTracker,
    queue: Arc<dyn DownloadScheduler>,
    cursors: Arc<dyn RescanScheduler>,
    settings: BackupSettings,
    events: EventBus,
}

impl Scanner {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        limiter: Arc<dyn RateLimiter>,
        queue: Arc<dyn DownloadScheduler>,
        cursors: Arc<dyn RescanScheduler>,
        settings: BackupSettings,
        events: EventBus,
    ) -> Self {
        Self {
            accounts,
            limits: LimitTracker::new(limiter, events.clone()),
            queue,
            cursors,
            settings,
            events,
        }
    }

    /// Scan every account concurrently.
    ///
    /// Returns the first account error after all accounts have finished.
    #[instrument(skip(self, cancel), fields(run_id = tracing::field::Empty))]
    pub async fn scan_all(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        if !self.settings.photos_backup_enabled().await? {
            info!("Photos backup disabled, skipping scan");
            return Ok(());
        }

        let accounts = self
            .accounts
            .accounts()
            .await
            .map_err(|e| BackupError::Provider(e.to_string()))?;

        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(accounts = accounts.len(), "Starting catalog scan");

        let token = cancel.child_token();
        let mut workers = JoinSet::new();
        for account in accounts {
            let scanner = self.clone();
            let token = token.clone();
            workers.spawn(
                async move {
                    let result = scanner
                        .scan_account(&account, run_id, &token)
                        .await
                        .map(|_| ());
                    (account.email, result)
                }
                .in_current_span(),
            );
        }

        join_accounts(workers).await
    }

    /// Scan one page of one account's catalog.
    #[instrument(
        skip(self, account, cancel),
        fields(
            account = %redact_if_sensitive("account", &account.email),
            client_id = %account.client_id
        )
    )]
    pub async fn scan_account(
        &self,
        account: &AccountCatalog,
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome> {
        let email = account.email.as_str();

        if self
            .limits
            .is_limited(email, LimitCategory::PhotosRequest)
            .await?
        {
            return Ok(ScanOutcome::Limited);
        }

        let page_token = self
            .cursors
            .get_cursor(PHOTOS_SCOPE, email)
            .await?
            .map(|cursor| cursor.next_page_token)
            .unwrap_or_default();

        if cancel.is_cancelled() {
            debug!("Cancelled before listing");
            return Ok(ScanOutcome::Cancelled);
        }

        self.events.emit_backup(BackupEvent::ScanStarted {
            run_id,
            account: email.to_string(),
        });

        let page = match account.catalog.list_items(&page_token).await {
            Ok(page) => page,
            Err(e) if e.is_throttled() => {
                return Err(self
                    .limits
                    .throttled(email, LimitCategory::PhotosRequest)
                    .await);
            }
            Err(e) => return Err(BackupError::Provider(e.to_string())),
        };

        self.limits
            .cleared(email, LimitCategory::PhotosRequest)
            .await?;

        let mut items_queued = 0u64;
        for item in &page.items {
            self.queue.schedule_download(email, &item.id).await?;
            items_queued += 1;
            self.events.emit_backup(BackupEvent::ItemQueued {
                account: email.to_string(),
                media_item_id: item.id.clone(),
            });
        }

        // An empty page ends the walk even if the provider sent a token
        let reached_end = page.items.is_empty() || page.is_last();
        if reached_end {
            self.cursors.delete_cursor(PHOTOS_SCOPE, email).await?;
        } else {
            self.cursors
                .save_cursor(
                    PHOTOS_SCOPE,
                    email,
                    &RescanRequest::at(page.next_page_token.clone()),
                )
                .await?;
        }

        info!(items_queued, reached_end, "Scanned catalog page");
        self.events.emit_backup(BackupEvent::ScanFinished {
            run_id,
            account: email.to_string(),
            items_queued,
            reached_end,
        });

        Ok(ScanOutcome::Scanned {
            items_queued,
            reached_end,
        })
    }
}
