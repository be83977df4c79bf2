//! End-to-end downloader behaviour against a fake catalog and a temp root.

mod common;

use bridge_traits::storage::FileSystemAccess;
use common::*;
use core_backup::{
    BackupError, DownloadScheduler, FileRecordRepository, LimitCategory, RateLimiter,
};
use core_runtime::events::{BackupEvent, CoreEvent};
use core_runtime::events::RunId;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;
use tokio_util::sync::CancellationToken;

const CREATED: &str = "2019-12-25T10:00:00Z";
const CREATED_UNIX: i64 = 1_577_268_000;
const ALICE_PATH: &str = "alice@example.com/2019/12/tree.jpg";

async fn catalog_with_tree() -> std::sync::Arc<FakeCatalog> {
    let catalog = FakeCatalog::new();
    catalog
        .add_item(media_item("tree", "tree.jpg", CREATED), b"original")
        .await;
    catalog
}

#[tokio::test]
async fn test_download_writes_file_record_and_timestamp() {
    let harness = Harness::new().await;
    let catalog = catalog_with_tree().await;
    harness.queue.schedule_download(ALICE, "tree").await.unwrap();

    harness
        .downloader(vec![account(ALICE, catalog)])
        .download_all(&CancellationToken::new())
        .await
        .unwrap();

    let path = harness.file(ALICE_PATH);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"original");
    assert_eq!(
        harness.fs.metadata(&path).await.unwrap().modified_at,
        Some(CREATED_UNIX)
    );

    let record = harness
        .records
        .get_file_record(ALICE, "tree")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.file_path_name, ALICE_PATH);
    assert_eq!(record.media_item.filename, "tree.jpg");

    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 0);
    assert!(!harness.file(&format!("{ALICE_PATH}.part")).exists());
}

#[tokio::test]
async fn test_identical_content_is_not_rewritten() {
    let harness = Harness::new().await;
    let catalog = catalog_with_tree().await;
    let downloader = harness.downloader(vec![account(ALICE, catalog.clone())]);
    let alice = account(ALICE, catalog);
    let cancel = CancellationToken::new();

    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    let first = downloader
        .download_account(&alice, RunId::new(), &cancel)
        .await
        .unwrap();
    assert_eq!(first.downloaded, 1);

    let path = harness.file(ALICE_PATH);
    #[cfg(unix)]
    let inode_before = std::fs::metadata(&path).unwrap().ino();

    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    let second = downloader
        .download_account(&alice, RunId::new(), &cancel)
        .await
        .unwrap();

    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped_identical, 1);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"original");
    // A rename from the partial file would have swapped the inode
    #[cfg(unix)]
    assert_eq!(std::fs::metadata(&path).unwrap().ino(), inode_before);
    assert!(!harness.file(&format!("{ALICE_PATH}.part")).exists());
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_changed_content_replaces_file() {
    let harness = Harness::new().await;
    let catalog = catalog_with_tree().await;
    let downloader = harness.downloader(vec![account(ALICE, catalog.clone())]);
    let cancel = CancellationToken::new();

    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    downloader.download_all(&cancel).await.unwrap();

    let path = harness.file(ALICE_PATH);
    let touched = chrono::DateTime::from_timestamp(START, 0).unwrap();
    harness.fs.set_modified_time(&path, touched).await.unwrap();

    catalog.set_content("tree", b"edited").await;
    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    downloader.download_all(&cancel).await.unwrap();

    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"edited");
    assert_eq!(
        harness.fs.metadata(&path).await.unwrap().modified_at,
        Some(CREATED_UNIX)
    );
}

#[tokio::test]
async fn test_unrecorded_file_on_disk_is_overwritten() {
    let harness = Harness::new().await;
    let catalog = catalog_with_tree().await;
    let path = harness.file(ALICE_PATH);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, b"stranger").await.unwrap();

    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    let summary = harness
        .downloader(vec![account(ALICE, catalog.clone())])
        .download_account(&account(ALICE, catalog), RunId::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"original");
}

#[tokio::test]
async fn test_batch_limit_caps_each_run() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    for id in ["i1", "i2", "i3", "i4", "i5"] {
        catalog
            .add_item(media_item(id, &format!("{id}.jpg"), CREATED), id.as_bytes())
            .await;
        harness.queue.schedule_download(ALICE, id).await.unwrap();
    }
    harness.settings.set_download_batch_limit(2).await.unwrap();
    let downloader = harness.downloader(vec![account(ALICE, catalog.clone())]);

    downloader
        .download_all(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(catalog.lookup_calls().await, 2);
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 3);
    // Lowest ids go first
    assert!(harness.file("alice@example.com/2019/12/i1.jpg").exists());
    assert!(harness.file("alice@example.com/2019/12/i2.jpg").exists());
    assert!(!harness.file("alice@example.com/2019/12/i3.jpg").exists());
}

#[tokio::test]
async fn test_content_throttle_keeps_request_queued() {
    let harness = Harness::new().await;
    let catalog = catalog_with_tree().await;
    catalog.throttle_content(true).await;
    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    let downloader = harness.downloader(vec![account(ALICE, catalog.clone())]);
    let cancel = CancellationToken::new();

    let err = downloader.download_all(&cancel).await.unwrap_err();

    assert!(matches!(
        err,
        BackupError::Throttled {
            category: LimitCategory::PhotosDownload
        }
    ));
    assert!(err.is_retryable());
    assert!(harness
        .limiter
        .limit_reached(ALICE, LimitCategory::PhotosDownload)
        .await
        .unwrap());
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 1);
    assert!(!harness.file(ALICE_PATH).exists());

    // Cooldown running: the next run does not touch the provider
    downloader.download_all(&cancel).await.unwrap();
    assert_eq!(catalog.lookup_calls().await, 1);

    // Once it expires the item goes through and the limit resets
    catalog.throttle_content(false).await;
    harness.clock.advance(chrono::Duration::seconds(181));
    downloader.download_all(&cancel).await.unwrap();
    assert!(harness.file(ALICE_PATH).exists());
    assert!(!harness
        .limiter
        .limit_reached(ALICE, LimitCategory::PhotosDownload)
        .await
        .unwrap());
    assert_eq!(
        harness
            .limiter
            .record(ALICE, LimitCategory::PhotosDownload)
            .await
            .unwrap()
            .map(|r| r.count),
        Some(0)
    );
}

#[tokio::test]
async fn test_lookup_throttle_uses_request_category() {
    let harness = Harness::new().await;
    let catalog = catalog_with_tree().await;
    catalog.throttle_lookup(true).await;
    harness.queue.schedule_download(ALICE, "tree").await.unwrap();

    let err = harness
        .downloader(vec![account(ALICE, catalog)])
        .download_all(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BackupError::Throttled {
            category: LimitCategory::PhotosRequest
        }
    ));
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 1);
}

#[tokio::test]
async fn test_provider_failure_drops_request_and_batch_continues() {
    let harness = Harness::new().await;
    let mut rx = harness.events.subscribe();
    let catalog = FakeCatalog::new();
    for id in ["a-broken", "b-good", "c-good"] {
        catalog
            .add_item(media_item(id, &format!("{id}.jpg"), CREATED), id.as_bytes())
            .await;
        harness.queue.schedule_download(ALICE, id).await.unwrap();
    }
    catalog.break_item("a-broken").await;

    let err = harness
        .downloader(vec![account(ALICE, catalog.clone())])
        .download_all(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Provider(_)));
    assert!(!err.is_retryable());
    assert_eq!(catalog.lookup_calls().await, 3);
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 0);
    assert!(!harness.file("alice@example.com/2019/12/a-broken.jpg").exists());
    assert!(harness.file("alice@example.com/2019/12/b-good.jpg").exists());
    assert!(harness.file("alice@example.com/2019/12/c-good.jpg").exists());

    let errors = harness.records.download_errors(ALICE).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].media_item_id, "a-broken");
    assert!(errors[0].message.contains("backend error"));

    let mut dropped = Vec::new();
    while let Ok(CoreEvent::Backup(event)) = rx.try_recv() {
        if let BackupEvent::ItemDropped { media_item_id, .. } = event {
            dropped.push(media_item_id);
        }
    }
    assert_eq!(dropped, vec!["a-broken"]);
}

#[tokio::test]
async fn test_first_drop_is_reported_after_batch() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog
        .add_item(media_item("odd", "odd.jpg", "not a date"), b"x")
        .await;
    harness.queue.schedule_download(ALICE, "odd").await.unwrap();
    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    catalog
        .add_item(media_item("tree", "tree.jpg", CREATED), b"original")
        .await;
    catalog.break_item("tree").await;

    let downloader = harness.downloader(vec![account(ALICE, catalog.clone())]);
    let err = downloader
        .download_account(&account(ALICE, catalog), RunId::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    // The first drop in queue order is the one reported
    assert!(matches!(err, BackupError::InvalidTimestamp { .. }));
    assert_eq!(harness.records.download_errors(ALICE).await.unwrap().len(), 2);
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_creation_time_drops_request() {
    let harness = Harness::new().await;
    let catalog = FakeCatalog::new();
    catalog
        .add_item(media_item("odd", "odd.jpg", "not a date"), b"x")
        .await;
    harness.queue.schedule_download(ALICE, "odd").await.unwrap();

    let err = harness
        .downloader(vec![account(ALICE, catalog)])
        .download_all(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::InvalidTimestamp { .. }));
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 0);
    assert_eq!(harness.records.download_errors(ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_accounts_are_isolated() {
    let harness = Harness::new().await;
    let alice = catalog_with_tree().await;
    alice.throttle_lookup(true).await;
    let bob = FakeCatalog::new();
    bob.add_item(media_item("sky", "sky.jpg", CREATED), b"blue")
        .await;
    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    harness.queue.schedule_download(BOB, "sky").await.unwrap();

    let result = harness
        .downloader(vec![account(ALICE, alice), account(BOB, bob)])
        .download_all(&CancellationToken::new())
        .await;

    assert!(matches!(result, Err(BackupError::Throttled { .. })));
    assert!(harness.file("bob@example.com/2019/12/sky.jpg").exists());
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 1);
    assert!(!harness
        .limiter
        .limit_reached(BOB, LimitCategory::PhotosRequest)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_cancelled_run_downloads_nothing() {
    let harness = Harness::new().await;
    let catalog = catalog_with_tree().await;
    harness.queue.schedule_download(ALICE, "tree").await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = harness
        .downloader(vec![account(ALICE, catalog.clone())])
        .download_account(&account(ALICE, catalog.clone()), RunId::new(), &cancel)
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 0);
    assert_eq!(catalog.lookup_calls().await, 0);
    assert_eq!(harness.queue.pending_count(ALICE).await.unwrap(), 1);
}
