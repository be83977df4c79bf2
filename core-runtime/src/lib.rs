//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the media backup core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Other crates depend on this one for their logging conventions, their view
//! of the injected bridges and the broadcast channel that reports scan and
//! download progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
