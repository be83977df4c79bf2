//! End-to-end scanner behaviour against a fake catalog.

mod common;

use async_trait::async_trait;
use common::*;
use core_backup::{
    BackupError, DownloadScheduler, LimitCategory, RateLimiter, RescanRequest, RescanScheduler,
    PHOTOS_SCOPE,
};
use core_runtime::events::{BackupEvent, CoreEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cursor store whose next save fails once.
struct FailingSaveCursors {
    inner: Arc<dyn RescanScheduler>,
    fail_next_save: AtomicBool,
}

#[async_trait]
impl RescanScheduler for FailingSaveCursors {
    async fn get_cursor(
        &self,
        scope: &str,
        account: &str,
    ) -> core_backup::Result<Option<RescanRequest>> {
        self.inner.get_cursor(scope, account).await
    }

    async fn save_cursor(
        &self,
        scope: &str,
        account: &str,
        cursor: &RescanRequest,
    ) -> core_backup::Result<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(BackupError::Database("disk I/O error".to_string()));
        }
        self.inner.save_cursor(scope, account, cursor).await
    }

    async fn delete_cursor(&self, scope: &str, account: &str) -> core_backup::Result<()> {
        self.inner.delete_cursor(scope, account).await
    }
}

#[tokio::test]
async fn test_scan_walks_pages_and_clears_cursor_at_end() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1", "a2"], "p1").await;
    catalog.add_page("p1", &["a3"], "").await;
    let scanner = harness.scanner(vec![account(ALICE, catalog.clone())]);
    let cancel = CancellationToken::new();

    scanner.scan_all(&cancel).await.unwrap();
    assert_eq!(
        harness.cursors.get_cursor(PHOTOS_SCOPE, ALICE).await.unwrap(),
        Some(RescanRequest::at("p1"))
    );
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 2);

    scanner.scan_all(&cancel).await.unwrap();
    assert!(harness
        .cursors
        .get_cursor(PHOTOS_SCOPE, ALICE)
        .await
        .unwrap()
        .is_none());
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 3);

    // Without a cursor the next run starts over
    scanner.scan_all(&cancel).await.unwrap();
    assert_eq!(catalog.list_calls().await, vec!["", "p1", ""]);
}

#[tokio::test]
async fn test_rescanning_does_not_duplicate_queue_entries() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1", "a2"], "").await;
    let scanner = harness.scanner(vec![account(ALICE, catalog.clone())]);
    let cancel = CancellationToken::new();

    scanner.scan_all(&cancel).await.unwrap();
    scanner.scan_all(&cancel).await.unwrap();

    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 2);
}

#[tokio::test]
async fn test_scan_resumes_from_saved_cursor() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1"], "p1").await;
    catalog.add_page("p1", &["a2"], "p2").await;
    let cancel = CancellationToken::new();

    harness
        .scanner(vec![account(ALICE, catalog.clone())])
        .scan_all(&cancel)
        .await
        .unwrap();

    // A fresh scanner over the same database picks up where the last one stopped
    harness
        .scanner(vec![account(ALICE, catalog.clone())])
        .scan_all(&cancel)
        .await
        .unwrap();

    assert_eq!(catalog.list_calls().await, vec!["", "p1"]);
    assert_eq!(
        harness.cursors.get_cursor(PHOTOS_SCOPE, ALICE).await.unwrap(),
        Some(RescanRequest::at("p2"))
    );
}

#[tokio::test]
async fn test_failed_cursor_save_refetches_same_page() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1", "a2"], "p1").await;
    catalog.add_page("p1", &["a3"], "").await;
    let cursors = Arc::new(FailingSaveCursors {
        inner: harness.cursors.clone(),
        fail_next_save: AtomicBool::new(true),
    });
    let scanner = harness.scanner_with_cursors(vec![account(ALICE, catalog.clone())], cursors);
    let cancel = CancellationToken::new();

    let err = scanner.scan_all(&cancel).await.unwrap_err();

    assert!(matches!(err, BackupError::Database(_)));
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 2);
    assert_eq!(
        harness.cursors.get_cursor(PHOTOS_SCOPE, ALICE).await.unwrap(),
        None
    );

    // The same page comes back and re-queueing its items adds nothing
    scanner.scan_all(&cancel).await.unwrap();

    assert_eq!(catalog.list_calls().await, vec!["", ""]);
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 2);
    assert_eq!(
        harness.cursors.get_cursor(PHOTOS_SCOPE, ALICE).await.unwrap(),
        Some(RescanRequest::at("p1"))
    );
}

#[tokio::test]
async fn test_request_rescan_restarts_walk() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1"], "p1").await;
    catalog.add_page("p1", &["a2"], "p2").await;
    let scanner = harness.scanner(vec![account(ALICE, catalog.clone())]);
    let cancel = CancellationToken::new();

    scanner.scan_all(&cancel).await.unwrap();
    scanner.scan_all(&cancel).await.unwrap();
    harness
        .cursors
        .request_rescan(PHOTOS_SCOPE, ALICE)
        .await
        .unwrap();
    scanner.scan_all(&cancel).await.unwrap();

    assert_eq!(catalog.list_calls().await, vec!["", "p1", ""]);
}

#[tokio::test]
async fn test_empty_page_ends_walk() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &[], "ignored").await;
    harness
        .cursors
        .save_cursor(PHOTOS_SCOPE, ALICE, &RescanRequest::at(""))
        .await
        .unwrap();

    harness
        .scanner(vec![account(ALICE, catalog)])
        .scan_all(&CancellationToken::new())
        .await
        .unwrap();

    assert!(harness
        .cursors
        .get_cursor(PHOTOS_SCOPE, ALICE)
        .await
        .unwrap()
        .is_none());
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_throttle_backs_off_and_recovers() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1"], "").await;
    catalog.throttle_listing(true).await;
    let scanner = harness.scanner(vec![account(ALICE, catalog.clone())]);
    let cancel = CancellationToken::new();

    let err = scanner.scan_all(&cancel).await.unwrap_err();
    assert!(matches!(
        err,
        BackupError::Throttled {
            category: LimitCategory::PhotosRequest
        }
    ));
    let record = harness
        .limiter
        .record(ALICE, LimitCategory::PhotosRequest)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((record.count, record.cooldown_until), (1, START + 180));

    // Cooldown running: the catalog is not called at all
    scanner.scan_all(&cancel).await.unwrap();
    assert_eq!(catalog.list_calls().await.len(), 1);

    // Second throttle after expiry triples the cooldown
    harness.clock.advance(chrono::Duration::seconds(181));
    assert!(scanner.scan_all(&cancel).await.is_err());
    let record = harness
        .limiter
        .record(ALICE, LimitCategory::PhotosRequest)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.count, 2);
    assert_eq!(record.cooldown_until, START + 181 + 540);

    // A successful listing resets the limit
    catalog.throttle_listing(false).await;
    harness.clock.advance(chrono::Duration::seconds(541));
    scanner.scan_all(&cancel).await.unwrap();
    let record = harness
        .limiter
        .record(ALICE, LimitCategory::PhotosRequest)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((record.count, record.cooldown_until), (0, 0));
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 1);
}

#[tokio::test]
async fn test_throttled_account_does_not_block_others() {
    let harness = Harness::new().await;
    let alice = FakeCatalog::new();
    alice.throttle_listing(true).await;
    let bob = FakeCatalog::new();
    bob.add_page("", &["b1", "b2"], "").await;

    let scanner = harness.scanner(vec![account(ALICE, alice), account(BOB, bob)]);
    let result = scanner.scan_all(&CancellationToken::new()).await;

    assert!(matches!(result, Err(BackupError::Throttled { .. })));
    assert_eq!(harness.queue.pending_count(BOB).await.unwrap(), 2);
    assert!(!harness
        .limiter
        .limit_reached(BOB, LimitCategory::PhotosRequest)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_provider_failure_leaves_cursor_untouched() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    harness
        .cursors
        .save_cursor(PHOTOS_SCOPE, ALICE, &RescanRequest::at("expired"))
        .await
        .unwrap();

    let result = harness
        .scanner(vec![account(ALICE, catalog)])
        .scan_all(&CancellationToken::new())
        .await;

    assert!(matches!(result, Err(BackupError::Provider(_))));
    assert_eq!(
        harness.cursors.get_cursor(PHOTOS_SCOPE, ALICE).await.unwrap(),
        Some(RescanRequest::at("expired"))
    );
    assert!(!harness
        .limiter
        .limit_reached(ALICE, LimitCategory::PhotosRequest)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_disabled_backup_skips_scan() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1"], "").await;
    harness.settings.set_photos_backup_enabled(false).await.unwrap();

    harness
        .scanner(vec![account(ALICE, catalog.clone())])
        .scan_all(&CancellationToken::new())
        .await
        .unwrap();

    assert!(catalog.list_calls().await.is_empty());
}

#[tokio::test]
async fn test_cancelled_scan_makes_no_calls() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1"], "").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harness
        .scanner(vec![account(ALICE, catalog.clone())])
        .scan_all(&cancel)
        .await;

    assert!(matches!(result, Err(BackupError::Cancelled)));
    assert!(catalog.list_calls().await.is_empty());
}

#[tokio::test]
async fn test_scan_emits_progress_events() {
    let harness = Harness::new().await;
    let mut rx = harness.events.subscribe();
    let catalog = FakeCatalog::new();
    catalog.add_page("", &["a1"], "").await;

    harness
        .scanner(vec![account(ALICE, catalog)])
        .scan_all(&CancellationToken::new())
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(CoreEvent::Backup(event)) = rx.try_recv() {
        seen.push(event);
    }

    assert!(matches!(seen[0], BackupEvent::ScanStarted { .. }));
    assert!(matches!(
        seen[1],
        BackupEvent::ItemQueued { ref media_item_id, .. } if media_item_id == "a1"
    ));
    assert!(matches!(
        seen[2],
        BackupEvent::ScanFinished {
            items_queued: 1,
            reached_end: true,
            ..
        }
    ));
}
