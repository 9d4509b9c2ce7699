//! End-to-end tests for the plugin tasks against a fake pytest.
//!
//! The fake pytest is a shell script run through `sh`. It writes a result log
//! that depends on the `exit_code` file in the project root and exits with
//! that code, so tests can flip the run between passing and failing.

#![cfg(unix)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;
use tower::ServiceExt;

use wipwatch_monitor::config::Config;
use wipwatch_monitor::hub::{LocalHub, RecordSink, StateQuery};
use wipwatch_monitor::routes::{create_router, AppState};
use wipwatch_monitor::runner::PytestRunner;
use wipwatch_monitor::subscription::{modified_pyfiles, modified_testfiles};
use wipwatch_monitor::tasks::{run_get_tests, run_wip_tests};
use wipwatch_monitor::types::{ChangeKind, FileEvent, Record, RecordKind};

const FAKE_PYTEST: &str = r#"
log=""
collect=""
while [ $# -gt 0 ]; do
    case "$1" in
        --result-log) shift; log="$1" ;;
        --collect-only) collect=1 ;;
    esac
    shift
done

if [ -n "$collect" ]; then
    printf "<Module tests/test_cart.py>\n  <Function test_total>\n  <Function test_empty>\n"
    exit 0
fi

code=$(cat exit_code)
if [ -f orphan ]; then
    printf ' stray line\n' > "$log"
fi
if [ -f latin1 ]; then
    printf 'F tests/t.py::test_x\n caf\351\n' >> "$log"
elif [ "$code" = "0" ]; then
    printf '. tests/test_cart.py::test_total\n' >> "$log"
else
    printf 'F tests/test_cart.py::test_total\n def test_total():\n E       assert 2 == 3\n' >> "$log"
fi
exit "$code"
"#;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

struct Project {
    dir: TempDir,
    config: Config,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        let script = dir.path().join("fake_pytest.sh");
        fs::write(&script, FAKE_PYTEST).unwrap();

        let mut config = Config::new(dir.path(), "shop");
        config.pytest_command = vec!["sh".to_string(), script.to_string_lossy().into_owned()];
        config.run_timeout = Duration::from_secs(10);

        let project = Self { dir, config };
        project.set_exit_code(1);
        project
    }

    fn set_exit_code(&self, code: i32) {
        fs::write(self.dir.path().join("exit_code"), code.to_string()).unwrap();
    }

    fn change(&self, key: &str, content: &str) -> FileEvent {
        FileEvent::new(
            "shop",
            "filecontent",
            key,
            ChangeKind::Modified,
            Some(content.to_string()),
        )
    }
}

fn start_wip_task(project: &Project, hub: &LocalHub) {
    let events = hub.subscribe(modified_pyfiles(&project.config));
    let runner = PytestRunner::from_config(&project.config).unwrap();
    let sink: Arc<dyn RecordSink> = Arc::new(hub.clone());
    tokio::spawn(run_wip_tests(events, runner, sink, "shop".to_string()));
}

async fn next_record(rx: &mut Receiver<Record>) -> Record {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("record should arrive")
        .expect("hub is open")
}

#[tokio::test]
async fn wip_run_publishes_status_events_then_state() {
    let project = Project::new();
    let hub = LocalHub::new();
    let mut records = hub.watch_records();
    start_wip_task(&project, &hub);

    hub.publish(project.change("src/cart.py", "def total():\n    return 2\n"));

    let running = next_record(&mut records).await;
    assert_eq!(running.kind, RecordKind::Event);
    assert_eq!(running.key, "wip_tests_status");
    assert_eq!(running.value["status"], "running");

    let finished = next_record(&mut records).await;
    assert_eq!(finished.value["status"], "failed");

    let state = next_record(&mut records).await;
    assert_eq!(state.kind, RecordKind::State);
    assert_eq!(state.key, "wip_tests");
    assert_eq!(state.task.as_deref(), Some("wip_tests"));
    assert_eq!(state.value["success"], false);
    assert_eq!(state.value["filename"], "src/cart.py");

    let details = state.value["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["result"], "F");
    assert_eq!(details[0]["function"], "test_total");
    assert_eq!(
        details[0]["message"],
        "def test_total():\nE       assert 2 == 3"
    );
}

#[tokio::test]
async fn status_change_tracks_the_flipping_file() {
    let project = Project::new();
    let hub = LocalHub::new();
    let mut records = hub.watch_records();
    start_wip_task(&project, &hub);

    // First run fails: cart.py becomes the status-change file.
    hub.publish(project.change("src/cart.py", "def total():\n    return 2\n"));
    for _ in 0..3 {
        next_record(&mut records).await;
    }

    // Still failing: the status-change file stays cart.py.
    hub.publish(project.change("src/tax.py", "RATE = 0.2\n"));
    for _ in 0..2 {
        next_record(&mut records).await;
    }
    let state = next_record(&mut records).await;
    assert_eq!(state.value["filename"], "src/cart.py");

    // Now passing: the fix in cart.py flips the status.
    project.set_exit_code(0);
    hub.publish(project.change("src/cart.py", "def total():\n    return 3\n"));
    next_record(&mut records).await;
    let passed = next_record(&mut records).await;
    assert_eq!(passed.value["status"], "passed");

    let state = next_record(&mut records).await;
    assert_eq!(state.value["success"], true);
    assert_eq!(state.value["filename"], "src/cart.py");
    let differences = state.value["differences"].as_str().unwrap();
    assert!(differences.contains("return 2"));
    assert!(differences.contains("return 3"));

    let stored = hub.states(&StateQuery::new().with_key("wip_tests"));
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, state.id);
}

#[tokio::test]
async fn non_python_and_deleted_files_do_not_trigger_runs() {
    let project = Project::new();
    let hub = LocalHub::new();
    let mut records = hub.watch_records();
    start_wip_task(&project, &hub);

    hub.publish(project.change("README.md", "# shop\n"));
    hub.publish(FileEvent::new(
        "shop",
        "filecontent",
        "src/old.py",
        ChangeKind::Deleted,
        None,
    ));
    hub.publish(project.change("src/cart.py", "x = 1\n"));

    let first = next_record(&mut records).await;
    assert_eq!(first.value["status"], "running");
    next_record(&mut records).await;
    let state = next_record(&mut records).await;
    assert_eq!(state.value["filename"], "src/cart.py");
}

#[tokio::test]
async fn strict_parsing_drops_details_of_malformed_log() {
    let mut project = Project::new();
    project.config.strict_parse = true;
    fs::write(project.dir.path().join("orphan"), "").unwrap();

    let hub = LocalHub::new();
    let mut records = hub.watch_records();
    start_wip_task(&project, &hub);

    hub.publish(project.change("src/cart.py", "x = 1\n"));
    next_record(&mut records).await;
    let finished = next_record(&mut records).await;
    assert_eq!(finished.value["status"], "failed");

    let state = next_record(&mut records).await;
    assert_eq!(state.value["details"], serde_json::json!([]));
}

#[tokio::test]
async fn permissive_parsing_keeps_records_after_orphan_line() {
    let project = Project::new();
    fs::write(project.dir.path().join("orphan"), "").unwrap();

    let hub = LocalHub::new();
    let mut records = hub.watch_records();
    start_wip_task(&project, &hub);

    hub.publish(project.change("src/cart.py", "x = 1\n"));
    for _ in 0..2 {
        next_record(&mut records).await;
    }
    let state = next_record(&mut records).await;
    let details = state.value["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert!(!details[0]["message"].as_str().unwrap().contains("stray"));
}

#[tokio::test]
async fn non_utf8_result_log_still_reports_failure() {
    let project = Project::new();
    fs::write(project.dir.path().join("latin1"), "").unwrap();

    let hub = LocalHub::new();
    let mut records = hub.watch_records();
    start_wip_task(&project, &hub);

    hub.publish(project.change("src/cart.py", "x = 1\n"));
    next_record(&mut records).await;
    let finished = next_record(&mut records).await;
    assert_eq!(finished.value["status"], "failed");

    let state = next_record(&mut records).await;
    assert_eq!(state.key, "wip_tests");
    let details = state.value["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["function"], "test_x");
    assert_eq!(details[0]["message"], "caf\u{fffd}");
}

#[tokio::test]
async fn unstartable_pytest_reports_error_and_keeps_listening() {
    let mut project = Project::new();
    project.config.pytest_command = vec!["wipwatch-no-such-pytest".to_string()];

    let hub = LocalHub::new();
    let mut records = hub.watch_records();
    start_wip_task(&project, &hub);

    for _ in 0..2 {
        hub.publish(project.change("src/cart.py", "x = 1\n"));
        let running = next_record(&mut records).await;
        assert_eq!(running.value["status"], "running");
        let error = next_record(&mut records).await;
        assert_eq!(error.value["status"], "error");
    }

    assert!(hub.states(&StateQuery::new()).is_empty());
}

#[tokio::test]
async fn test_file_change_recollects_and_serves_inventory() {
    let project = Project::new();
    let hub = LocalHub::new();
    let mut records = hub.watch_records();

    let events = hub.subscribe(modified_testfiles(&project.config));
    let runner = PytestRunner::from_config(&project.config).unwrap();
    let sink: Arc<dyn RecordSink> = Arc::new(hub.clone());
    tokio::spawn(run_get_tests(events, runner, sink, "shop".to_string()));

    // Outside the tests path: ignored by the collection task.
    hub.publish(project.change("src/cart.py", "x = 1\n"));
    hub.publish(project.change("tests/test_cart.py", "def test_total(): pass\n"));

    let state = next_record(&mut records).await;
    assert_eq!(state.key, "pytest-tests");
    assert_eq!(state.task.as_deref(), Some("get_tests"));
    let tests = state.value.as_array().unwrap();
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[0]["module"], "tests/test_cart.py");
    assert_eq!(tests[1]["function"], "test_empty");

    let app = create_router(AppState::new(project.config.clone(), hub));
    let response = app
        .oneshot(Request::builder().uri("/tests").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let served: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(served[0]["value"], state.value);
}
