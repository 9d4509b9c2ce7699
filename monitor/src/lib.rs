//! wipwatch Monitor - re-runs WIP pytest tests on source changes.
//!
//! The monitor watches a Python project, re-runs the tests carrying the WIP
//! marker whenever a `.py` file changes, and publishes the outcome into an
//! in-process hub. A second task re-collects the test inventory whenever a
//! test file changes. Result logs are parsed by [`wipwatch_results`].
//!
//! # Data flow
//!
//! ```text
//! SourceWatcher --FileEvent--> LocalHub --EventStream--> wip_tests / get_tests
//!                                  ^                              |
//!                                  +-------- Record (put) --------+
//!                                  |
//!                                  +--> /tests, /ws
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations
//! - [`types`]: File events and hub records
//! - [`hub`]: `RecordSink` seam and the in-process `LocalHub`
//! - [`subscription`]: Event filters and the two named subscriptions
//! - [`watcher`]: File system watcher producing file events
//! - [`runner`]: pytest subprocess invocations
//! - [`diff`]: Side-by-side HTML diff tables
//! - [`tasks`]: The `wip_tests` and `get_tests` task loops
//! - [`routes`]: HTTP routes
//! - [`utils`]: Shared utilities (debouncing)

pub mod config;
pub mod diff;
pub mod error;
pub mod hub;
pub mod routes;
pub mod runner;
pub mod subscription;
pub mod tasks;
pub mod types;
pub mod utils;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use error::{MonitorError, Result};
pub use hub::{EventStream, HubError, LocalHub, RecordSink, StateQuery};
pub use runner::{PytestRunner, RunnerError, WipRun};
pub use subscription::{modified_pyfiles, modified_testfiles, EventFilter};
pub use tasks::{run_get_tests, run_wip_tests, WipTracker};
pub use types::{ChangeKind, FileEvent, Record, RecordKind, TestStatus};
pub use watcher::{SourceWatcher, WatcherError};
