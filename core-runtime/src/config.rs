//! # Core Configuration Module
//!
//! Provides configuration management for the media backup core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the bridges and static settings the core needs. It
//! enforces fail-fast validation so a missing capability is reported at
//! startup rather than on the first scan.
//!
//! ## Bridges
//!
//! - `FileSystemAccess` - Required for writing the backup tree (desktop default: tokio fs)
//! - `HttpClient` - Used by remote catalog providers (desktop default: reqwest)
//! - `SettingsStore` - Runtime-mutable settings. When absent, the service opens a
//!   SQLite-backed store on its own database (desktop only)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/media-backup/backup.db")
//!     .download_root("/srv/backup")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Without `desktop-shims`, leaving out a required bridge fails with
//! [`Error::CapabilityMissing`] naming the capability:
//!
//! ```ignore
//! let err = CoreConfig::builder()
//!     .database_path("/tmp/backup.db")
//!     .build()
//!     .unwrap_err();
//! ```

use crate::error::{Error, Result};
use bridge_traits::{FileSystemAccess, HttpClient, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Default root of the backup tree when none is configured and no
/// per-user data directory is available
pub const DEFAULT_DOWNLOAD_ROOT: &str = "/data";

/// Directory under the desktop data directory that holds the backup tree
pub const DESKTOP_LIBRARY_DIR: &str = "library";

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Core configuration for the media backup core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Root directory of the backup tree, used to seed the `root_path` setting
    pub download_root: PathBuf,

    /// HTTP client for provider API requests
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// File system access abstraction (required)
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Runtime settings storage
    pub settings_store: Option<Arc<dyn SettingsStore>>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("download_root", &self.download_root)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("file_system", &"FileSystemAccess { ... }")
            .field(
                "settings_store",
                &self
                    .settings_store
                    .as_ref()
                    .map(|_| "SettingsStore { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Download root is not empty
    /// - Event buffer holds at least one event
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.download_root.as_os_str().is_empty() {
            return Err(Error::Config("Download root cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The settings store, or a `CapabilityMissing` error naming it.
    pub fn require_settings_store(&self) -> Result<Arc<dyn SettingsStore>> {
        self.settings_store
            .clone()
            .ok_or_else(settings_store_missing_error)
    }

    /// The HTTP client, or a `CapabilityMissing` error naming it.
    pub fn require_http_client(&self) -> Result<Arc<dyn HttpClient>> {
        self.http_client.clone().ok_or_else(|| Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "An HttpClient is required to talk to remote catalogs. \
                      Enable the 'desktop-shims' feature or inject an implementation."
                .to_string(),
        })
    }
}

fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for job delays and backup settings. \
                 Desktop: enable the 'desktop-shims' feature to use the SQLite-backed store."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    Ok(Arc::new(TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required to write the backup tree. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use TokioFileSystem."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_download_root() -> PathBuf {
    bridge_desktop::default_data_directory().join(DESKTOP_LIBRARY_DIR)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_download_root() -> PathBuf {
    PathBuf::from(DEFAULT_DOWNLOAD_ROOT)
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Some(Arc::new(client)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    download_root: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database file path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the root of the backup tree.
    ///
    /// Default: `library` under the per-user data directory with
    /// `desktop-shims`, `/data` otherwise. This only seeds the `root_path`
    /// setting on first start; afterwards the stored setting wins.
    pub fn download_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_root = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets how many events a slow subscriber may lag behind.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - The database path is missing
    /// - A required bridge is missing and no desktop default exists
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client()?,
        };

        #[cfg(not(feature = "desktop-shims"))]
        if self.settings_store.is_none() {
            return Err(settings_store_missing_error());
        }

        let config = CoreConfig {
            database_path,
            download_root: self
                .download_root
                .unwrap_or_else(provide_default_download_root),
            http_client,
            file_system,
            settings_store: self.settings_store,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
