//! Hub record types for wipwatch.
//!
//! Two shapes flow through the hub: [`FileEvent`]s come in from the source
//! watcher, [`Record`]s go out from the plugin tasks. All types serialize to
//! camelCase JSON.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of the random alphanumeric suffix in IDs.
const ID_SUFFIX_LEN: usize = 20;

/// Prefix for inbound file event IDs.
const FILE_EVENT_ID_PREFIX: &str = "fev_";

/// Prefix for outbound record IDs.
const RECORD_ID_PREFIX: &str = "rec_";

/// Plugin name the source watcher publishes file events under.
pub const FILECONTENT_PLUGIN: &str = "filecontent";

/// Plugin name this monitor publishes records under.
pub const PYTEST_PLUGIN: &str = "pytest";

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change to a file under the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    /// Unique identifier, `fev_` followed by 20 alphanumeric characters.
    pub id: String,

    /// Project the file belongs to.
    pub project: String,

    /// Plugin that produced the event.
    pub plugin: String,

    /// Path relative to the project root, `/`-separated.
    pub key: String,

    /// Kind of change.
    pub kind: ChangeKind,

    /// File content after the change. `None` for deletions.
    pub content: Option<String>,

    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Creates a new file event with a random ID.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        plugin: impl Into<String>,
        key: impl Into<String>,
        kind: ChangeKind,
        content: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(FILE_EVENT_ID_PREFIX),
            project: project.into(),
            plugin: plugin.into(),
            key: key.into(),
            kind,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Whether a record is retained by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Latest value for a key; the hub keeps the most recent one.
    State,
    /// Transient notification; broadcast and forgotten.
    Event,
}

/// An outbound record published by a plugin task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique identifier, `rec_` followed by 20 alphanumeric characters.
    pub id: String,

    /// State or event.
    pub kind: RecordKind,

    /// Project the record is about.
    pub project: String,

    /// Publishing plugin.
    pub plugin: String,

    /// Record key (e.g. `wip_tests`).
    pub key: String,

    /// Task that produced the record, when it came from a task loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Record payload.
    pub value: serde_json::Value,

    /// When the record was created.
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Creates a state record.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use wipwatch_monitor::types::{Record, RecordKind};
    ///
    /// let state = Record::state("demo", "pytest", "wip_tests", json!({"success": true}));
    /// assert_eq!(state.kind, RecordKind::State);
    /// assert!(state.id.starts_with("rec_"));
    /// ```
    #[must_use]
    pub fn state(
        project: impl Into<String>,
        plugin: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self::new(RecordKind::State, project, plugin, key, value)
    }

    /// Creates an event record.
    #[must_use]
    pub fn event(
        project: impl Into<String>,
        plugin: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self::new(RecordKind::Event, project, plugin, key, value)
    }

    /// Tags the record with the task that produced it.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    fn new(
        kind: RecordKind,
        project: impl Into<String>,
        plugin: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            id: generate_id(RECORD_ID_PREFIX),
            kind,
            project: project.into(),
            plugin: plugin.into(),
            key: key.into(),
            task: None,
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Status of a WIP test run as published on `wip_tests_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Running,
    Passed,
    Failed,
    /// The test command could not be run at all.
    Error,
}

impl TestStatus {
    /// Maps a test command exit code to a final status.
    #[must_use]
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

/// Generates an ID of `prefix` followed by 20 lowercase alphanumerics.
fn generate_id(prefix: &str) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();

    format!("{prefix}{suffix}")
}
