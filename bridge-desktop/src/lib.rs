//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with streaming bodies for media content
//! - `FileSystemAccess` using `tokio::fs`
//! - `SettingsStore` using a SQLite-backed key-value table
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let fs = TokioFileSystem::new();
//!     let settings = SqliteSettingsStore::new(default_data_directory().join("settings.db")).await?;
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;

use std::path::PathBuf;

/// Application name used for the per-user data directory
pub const APP_DIR_NAME: &str = "media-backup";

/// Per-user data directory for the database and default backup root.
///
/// Falls back to `~/.local/share` and then the working directory when the
/// platform does not report one.
pub fn default_data_directory() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_data_directory_is_app_scoped() {
        let dir = default_data_directory();
        assert!(dir.ends_with(APP_DIR_NAME));
    }
}
