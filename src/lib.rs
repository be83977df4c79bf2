//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `media-backup-workspace`
//! and enable `desktop-shims` to get the fully wired `backup-service`.

#[cfg(feature = "desktop-shims")]
pub use backup_service;
