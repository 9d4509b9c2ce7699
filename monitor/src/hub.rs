//! In-process data hub.
//!
//! The hub connects the source watcher to the plugin tasks and the plugin
//! tasks to whoever observes their output (the HTTP routes, WebSocket
//! clients). It has two sides:
//!
//! - **Inbound**: [`FileEvent`]s are broadcast to every [`EventStream`];
//!   each stream yields only the events its [`EventFilter`] accepts.
//! - **Outbound**: tasks publish [`Record`]s through the [`RecordSink`]
//!   trait. State records are retained (latest per project, plugin and key);
//!   event records are only broadcast.
//!
//! Both sides use tokio broadcast channels. A slow receiver that falls more
//! than the channel capacity behind skips the oldest messages.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use wipwatch_monitor::hub::{LocalHub, RecordSink, StateQuery};
//! use wipwatch_monitor::types::Record;
//!
//! let hub = LocalHub::new();
//! hub.put(Record::state("shop", "pytest", "wip_tests", json!({"success": true}))).unwrap();
//!
//! let states = hub.states(&StateQuery::new().with_key("wip_tests"));
//! assert_eq!(states.len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::subscription::EventFilter;
use crate::types::{FileEvent, Record, RecordKind};

/// Default channel capacity for both hub channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Errors that can occur when publishing to the hub.
#[derive(Error, Debug)]
pub enum HubError {
    /// A writer panicked while holding the state store lock.
    #[error("state store lock poisoned")]
    LockPoisoned,
}

/// Outbound side of the hub as seen by plugin tasks.
pub trait RecordSink: Send + Sync {
    /// Publishes a record. State records replace the previous state with the
    /// same project, plugin and key.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be stored.
    fn put(&self, record: Record) -> Result<(), HubError>;

    /// Returns retained states matching `query`, oldest first.
    fn states(&self, query: &StateQuery) -> Vec<Record>;
}

/// Criteria for looking up retained states. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateQuery {
    pub project: Option<String>,
    pub plugin: Option<String>,
    pub key: Option<String>,
}

impl StateQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Checks if a record satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.project.as_ref().is_none_or(|p| &record.project == p)
            && self.plugin.as_ref().is_none_or(|p| &record.plugin == p)
            && self.key.as_ref().is_none_or(|k| &record.key == k)
    }
}

/// Identity of a retained state: project, plugin and key.
type StateKey = (String, String, String);

/// Hub implementation backed by tokio broadcast channels.
///
/// `LocalHub` is `Clone`; clones share the same channels and state store.
#[derive(Debug, Clone)]
pub struct LocalHub {
    file_events: Sender<FileEvent>,
    records: Sender<Record>,
    states: Arc<RwLock<HashMap<StateKey, Record>>>,
}

impl LocalHub {
    /// Creates a hub with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a hub with the given channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (file_events, _) = broadcast::channel(capacity);
        let (records, _) = broadcast::channel(capacity);
        debug!(capacity, "Created local hub");
        Self {
            file_events,
            records,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Broadcasts a file event to every stream. Returns the number of
    /// streams that received it.
    pub fn publish(&self, event: FileEvent) -> usize {
        trace!(
            event_id = %event.id,
            key = %event.key,
            kind = ?event.kind,
            "Publishing file event"
        );

        match self.file_events.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No subscriptions to receive file event");
                0
            }
        }
    }

    /// Opens a stream of the file events `filter` accepts.
    ///
    /// Only events published after this call are delivered.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        debug!(filter = ?filter, "New file event subscription");
        EventStream {
            rx: self.file_events.subscribe(),
            filter,
        }
    }

    /// Receives every record published after this call.
    #[must_use]
    pub fn watch_records(&self) -> Receiver<Record> {
        self.records.subscribe()
    }

    /// Returns the number of active record observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.records.receiver_count()
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for LocalHub {
    fn put(&self, record: Record) -> Result<(), HubError> {
        trace!(
            record_id = %record.id,
            kind = ?record.kind,
            key = %record.key,
            "Publishing record"
        );

        if record.kind == RecordKind::State {
            let key = (
                record.project.clone(),
                record.plugin.clone(),
                record.key.clone(),
            );
            let mut states = self.states.write().map_err(|_| HubError::LockPoisoned)?;
            states.insert(key, record.clone());
        }

        // No observers is normal when nobody is connected.
        let _ = self.records.send(record);
        Ok(())
    }

    fn states(&self, query: &StateQuery) -> Vec<Record> {
        let Ok(states) = self.states.read() else {
            warn!("State store lock poisoned, returning no states");
            return Vec::new();
        };

        let mut matching: Vec<Record> = states
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.timestamp);
        matching
    }
}

/// Filtered stream of inbound file events.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<FileEvent>,
    filter: EventFilter,
}

impl EventStream {
    /// Waits for the next matching event.
    ///
    /// Returns `None` once the hub has been dropped.
    pub async fn next(&mut self) -> Option<FileEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(event) => {
                    trace!(event_id = %event.id, key = %event.key, "File event filtered out");
                }
                Err(RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Subscription lagged, skipped file events");
                }
                Err(RecvError::Closed) => {
                    debug!("Hub closed, ending subscription");
                    return None;
                }
            }
        }
    }
}
