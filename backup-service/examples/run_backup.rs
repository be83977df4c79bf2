//! One scan and one download batch for a single Google Photos account.
//!
//! Run with:
//! ```bash
//! BACKUP_ACCOUNT=me@example.com \
//! BACKUP_ACCESS_TOKEN=ya29... \
//! BACKUP_ROOT=/tmp/photos \
//! cargo run -p backup-service --example run_backup
//!
//! # JSON logs
//! cargo run -p backup-service --example run_backup -- json
//! ```

use anyhow::Context;
use backup_service::{BackupService, StaticAccountDirectory};
use bridge_traits::time::LogLevel;
use core_runtime::config::CoreConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = match env::args().nth(1).as_deref() {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };
    init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(LogLevel::Info),
    )?;

    let account = env::var("BACKUP_ACCOUNT").context("BACKUP_ACCOUNT is not set")?;
    let token = env::var("BACKUP_ACCESS_TOKEN").context("BACKUP_ACCESS_TOKEN is not set")?;
    let root = PathBuf::from(env::var("BACKUP_ROOT").context("BACKUP_ROOT is not set")?);

    let config = CoreConfig::builder()
        .database_path(root.join(".backup").join("state.db"))
        .download_root(&root)
        .build()?;
    let http_client = config.require_http_client()?;

    let accounts = Arc::new(StaticAccountDirectory::default());
    accounts
        .add_google_photos(&account, "example", &token, http_client)
        .await;

    let service = BackupService::bootstrap(config, accounts).await?;

    service.scan_all().await?;
    info!(
        pending = service.pending_downloads(&account).await?,
        "Scan finished"
    );

    service.download_all().await?;
    let errors = service.download_errors(&account).await?;
    info!(
        pending = service.pending_downloads(&account).await?,
        errors = errors.len(),
        "Download batch finished"
    );

    service.shutdown().await;
    Ok(())
}
