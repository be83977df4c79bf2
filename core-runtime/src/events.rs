//! # Event Bus System
//!
//! Broadcasts what the backup core is doing using `tokio::sync::broadcast`,
//! so hosts can observe progress without polling the database.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wrapping the backup-domain [`BackupEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ```text
//! ┌─────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Scanner ├────────>│           ├────────────>│ Subscriber │
//! └─────────┘         │ EventBus  │             └────────────┘
//! ┌────────────┐ emit │           │  subscribe  ┌────────────┐
//! │ Downloader ├─────>│           ├────────────>│ Subscriber │
//! └────────────┘      └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{BackupEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Backup(BackupEvent::ItemQueued {
//!         account: "alice@example.com".to_string(),
//!         media_item_id: "item-1".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! Emitting with no subscribers returns an error that producers ignore with
//! `.ok()`; events are advisory and never part of the persisted state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, SendError};
use uuid::Uuid;

pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Identifier shared by every log line and event of one scan or download run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scanner, downloader and job runner activity
    Backup(BackupEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Backup(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Backup(BackupEvent::JobFailed { .. }) => EventSeverity::Error,
            CoreEvent::Backup(BackupEvent::ItemDropped { .. }) => EventSeverity::Warning,
            CoreEvent::Backup(BackupEvent::LimitReached { .. }) => EventSeverity::Warning,
            CoreEvent::Backup(BackupEvent::ScanFinished { .. }) => EventSeverity::Info,
            CoreEvent::Backup(BackupEvent::ItemDownloaded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events emitted by the backup pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BackupEvent {
    /// A scan of one account's catalog began.
    ScanStarted { run_id: RunId, account: String },
    /// A scan of one account's catalog ended successfully.
    ScanFinished {
        run_id: RunId,
        account: String,
        /// Items enqueued from the page that was read.
        items_queued: u64,
        /// True when the catalog end was reached and the cursor cleared.
        reached_end: bool,
    },
    /// An item id was put on the download queue.
    ItemQueued {
        account: String,
        media_item_id: String,
    },
    /// An item's content is on disk and recorded.
    ItemDownloaded {
        run_id: RunId,
        account: String,
        media_item_id: String,
        /// Path relative to the backup root
        path: String,
        /// True when the existing file already had identical content.
        skipped_identical: bool,
    },
    /// A queued item was removed without being downloaded.
    ItemDropped {
        run_id: RunId,
        account: String,
        media_item_id: String,
        reason: String,
    },
    /// The provider throttled a call and a cooldown was recorded.
    LimitReached {
        account: String,
        category: String,
        /// Unix seconds until which calls in this category are skipped
        cooldown_until: i64,
    },
    /// A successful call reset the throttle state.
    LimitCleared { account: String, category: String },
    /// A scheduled job returned an error; the runner keeps going.
    JobFailed { job: String, message: String },
}

impl BackupEvent {
    fn description(&self) -> &str {
        match self {
            BackupEvent::ScanStarted { .. } => "Catalog scan started",
            BackupEvent::ScanFinished { .. } => "Catalog scan finished",
            BackupEvent::ItemQueued { .. } => "Item queued for download",
            BackupEvent::ItemDownloaded { .. } => "Item downloaded",
            BackupEvent::ItemDropped { .. } => "Item dropped from queue",
            BackupEvent::LimitReached { .. } => "Rate limit reached",
            BackupEvent::LimitCleared { .. } => "Rate limit cleared",
            BackupEvent::JobFailed { .. } => "Background job failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus yields another producer on the same channel. Each
/// `subscribe()` creates an independent receiver; slow receivers get
/// `RecvError::Lagged` instead of blocking producers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A zero capacity is bumped to one since broadcast channels need room
    /// for at least one event.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Shorthand for emitting a [`BackupEvent`] and ignoring a missing audience.
    pub fn emit_backup(&self, event: BackupEvent) {
        self.emit(CoreEvent::Backup(event)).ok();
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{BackupEvent, CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let failures = EventStream::new(event_bus.subscribe()).filter(|event| {
///     matches!(event, CoreEvent::Backup(BackupEvent::JobFailed { .. }))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
