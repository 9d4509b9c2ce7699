//! The pytest plugin tasks.
//!
//! - `wip_tests`: on every Python file change, re-run the WIP tests, publish
//!   the running and final status as events and the full outcome as the
//!   `wip_tests` state.
//! - `get_tests`: on every test file change, re-collect the test inventory
//!   and publish it as the `pytest-tests` state.
//!
//! Each task handles its events one at a time; changes arriving during a run
//! wait in the hub subscription until the run finishes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};
use wipwatch_results::ResultRecord;

use crate::diff::html_table;
use crate::hub::{EventStream, RecordSink};
use crate::runner::PytestRunner;
use crate::types::{FileEvent, Record, TestStatus, PYTEST_PLUGIN};

/// Task name for WIP test runs.
pub const WIP_TESTS_TASK: &str = "wip_tests";

/// Task name for test collection.
pub const GET_TESTS_TASK: &str = "get_tests";

/// Event key carrying run status.
pub const WIP_STATUS_KEY: &str = "wip_tests_status";

/// State key carrying the latest WIP outcome.
pub const WIP_STATE_KEY: &str = "wip_tests";

/// State key carrying the collected test inventory.
pub const TESTS_STATE_KEY: &str = "pytest-tests";

/// Unchanged lines shown around each diff hunk.
const DIFF_CONTEXT_LINES: usize = 5;

/// Remembers what is needed to explain a status change.
///
/// A status change is a run whose exit code differs from the previous run's.
/// The file whose change triggered it, and the diff of that change, are kept
/// until the next status change.
#[derive(Debug, Default)]
pub struct WipTracker {
    last_exit_code: Option<i32>,
    status_filename: Option<String>,
    status_differences: String,
    contents: HashMap<String, String>,
}

impl WipTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of a run triggered by `event`.
    ///
    /// Returns `true` if the exit code changed, in which case the event's file
    /// becomes the status-change file.
    pub fn observe(&mut self, event: &FileEvent, exit_code: i32) -> bool {
        let content = event.content.clone().unwrap_or_default();
        let changed = self.last_exit_code != Some(exit_code);

        if changed {
            let previous = self.contents.get(&event.key).map_or("", String::as_str);
            self.status_differences = html_table(previous, &content, DIFF_CONTEXT_LINES);
            self.status_filename = Some(event.key.clone());
            self.last_exit_code = Some(exit_code);
        }

        self.contents.insert(event.key.clone(), content);
        changed
    }

    /// File that triggered the last status change.
    #[must_use]
    pub fn status_filename(&self) -> Option<&str> {
        self.status_filename.as_deref()
    }

    /// HTML diff of the change that triggered the last status change.
    #[must_use]
    pub fn status_differences(&self) -> &str {
        &self.status_differences
    }

    /// Builds the `wip_tests` state value for a finished run.
    #[must_use]
    pub fn state_value(&self, exit_code: i32, details: &[ResultRecord]) -> serde_json::Value {
        json!({
            "success": exit_code == 0,
            "filename": self.status_filename,
            "differences": self.status_differences,
            "status": TestStatus::from_exit_code(exit_code),
            "details": details,
        })
    }
}

/// Runs the `wip_tests` task until the subscription ends.
pub async fn run_wip_tests(
    mut events: EventStream,
    runner: PytestRunner,
    sink: Arc<dyn RecordSink>,
    project: String,
) {
    info!(task = WIP_TESTS_TASK, "Task started");
    let mut tracker = WipTracker::new();

    while let Some(event) = events.next().await {
        debug!(task = WIP_TESTS_TASK, key = %event.key, "Handling file change");
        publish_status(sink.as_ref(), &project, TestStatus::Running);

        let run = match runner.run_wip().await {
            Ok(run) => run,
            Err(e) => {
                error!(task = WIP_TESTS_TASK, error = %e, "Failed to run WIP tests");
                publish_status(sink.as_ref(), &project, TestStatus::Error);
                continue;
            }
        };

        publish_status(
            sink.as_ref(),
            &project,
            TestStatus::from_exit_code(run.exit_code),
        );

        if tracker.observe(&event, run.exit_code) {
            info!(
                key = %event.key,
                exit_code = run.exit_code,
                "WIP test status changed"
            );
        }

        let state = Record::state(
            project.as_str(),
            PYTEST_PLUGIN,
            WIP_STATE_KEY,
            tracker.state_value(run.exit_code, &run.records),
        )
        .with_task(WIP_TESTS_TASK);
        put(sink.as_ref(), state);
    }

    info!(task = WIP_TESTS_TASK, "Task stopped");
}

/// Runs the `get_tests` task until the subscription ends.
pub async fn run_get_tests(
    mut events: EventStream,
    runner: PytestRunner,
    sink: Arc<dyn RecordSink>,
    project: String,
) {
    info!(task = GET_TESTS_TASK, "Task started");

    while let Some(event) = events.next().await {
        debug!(task = GET_TESTS_TASK, key = %event.key, "Handling test file change");

        let tests = match runner.collect().await {
            Ok(tests) => tests,
            Err(e) => {
                error!(task = GET_TESTS_TASK, error = %e, "Failed to collect tests");
                continue;
            }
        };

        let value = match serde_json::to_value(&tests) {
            Ok(value) => value,
            Err(e) => {
                error!(task = GET_TESTS_TASK, error = %e, "Failed to encode collected tests");
                continue;
            }
        };

        let state = Record::state(project.as_str(), PYTEST_PLUGIN, TESTS_STATE_KEY, value)
            .with_task(GET_TESTS_TASK);
        put(sink.as_ref(), state);
    }

    info!(task = GET_TESTS_TASK, "Task stopped");
}

fn publish_status(sink: &dyn RecordSink, project: &str, status: TestStatus) {
    let event = Record::event(project, PYTEST_PLUGIN, WIP_STATUS_KEY, json!({ "status": status }));
    put(sink, event);
}

fn put(sink: &dyn RecordSink, record: Record) {
    if let Err(e) = sink.put(record) {
        warn!(error = %e, "Failed to publish record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;

    fn change(key: &str, content: &str) -> FileEvent {
        FileEvent::new(
            "shop",
            "filecontent",
            key,
            ChangeKind::Modified,
            Some(content.to_string()),
        )
    }

    #[test]
    fn first_run_is_always_a_status_change() {
        let mut tracker = WipTracker::new();
        assert!(tracker.observe(&change("src/cart.py", "total = 0\n"), 0));
        assert_eq!(tracker.status_filename(), Some("src/cart.py"));
        assert!(tracker.status_differences().contains("diff_add"));
    }

    #[test]
    fn same_exit_code_keeps_previous_status_change() {
        let mut tracker = WipTracker::new();
        tracker.observe(&change("src/cart.py", "total = 0\n"), 1);
        let differences = tracker.status_differences().to_string();

        assert!(!tracker.observe(&change("src/tax.py", "rate = 0.2\n"), 1));
        assert_eq!(tracker.status_filename(), Some("src/cart.py"));
        assert_eq!(tracker.status_differences(), differences);
    }

    #[test]
    fn status_change_diffs_against_last_known_content() {
        let mut tracker = WipTracker::new();
        tracker.observe(&change("src/cart.py", "total = 0\n"), 1);
        tracker.observe(&change("src/cart.py", "total = 1\n"), 1);

        assert!(tracker.observe(&change("src/cart.py", "total = 2\n"), 0));
        let differences = tracker.status_differences();
        assert!(differences.contains("total = 1"));
        assert!(differences.contains("total = 2"));
        assert!(!differences.contains("total = 0"));
    }

    #[test]
    fn state_value_shape() {
        let mut tracker = WipTracker::new();
        tracker.observe(&change("tests/test_cart.py", "def test_a(): pass\n"), 1);

        let details = vec![ResultRecord {
            result: 'F',
            file: "tests/test_cart.py".to_string(),
            class: None,
            function: "test_a".to_string(),
            message: "assert 0".to_string(),
        }];
        let value = tracker.state_value(1, &details);

        assert_eq!(value["success"], false);
        assert_eq!(value["status"], "failed");
        assert_eq!(value["filename"], "tests/test_cart.py");
        assert_eq!(value["details"][0]["function"], "test_a");
        assert!(value["details"][0]["class"].is_null());
        assert!(value["differences"].as_str().unwrap().starts_with("<table"));
    }

    #[test]
    fn state_value_before_any_change() {
        let tracker = WipTracker::new();
        let value = tracker.state_value(0, &[]);
        assert_eq!(value["success"], true);
        assert_eq!(value["status"], "passed");
        assert!(value["filename"].is_null());
        assert_eq!(value["differences"], "");
    }
}
