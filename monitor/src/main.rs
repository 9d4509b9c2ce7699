//! wipwatch Monitor - re-runs WIP pytest tests on source changes.
//!
//! # Commands
//!
//! - `wipwatch-monitor run`: watch the project, run the plugin tasks and
//!   serve the HTTP routes
//! - `wipwatch-monitor parse <FILE>`: parse a pytest result log and print the
//!   records as JSON
//! - `wipwatch-monitor collect`: collect the test inventory once and print it
//!   as JSON
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use wipwatch_monitor::config::Config;
use wipwatch_monitor::hub::{LocalHub, RecordSink};
use wipwatch_monitor::routes::{create_router, AppState};
use wipwatch_monitor::runner::PytestRunner;
use wipwatch_monitor::subscription::{modified_pyfiles, modified_testfiles};
use wipwatch_monitor::tasks::{run_get_tests, run_wip_tests};
use wipwatch_monitor::watcher::SourceWatcher;
use wipwatch_results::ResultLogParser;

/// wipwatch Monitor - re-runs WIP pytest tests on source changes.
#[derive(Parser, Debug)]
#[command(name = "wipwatch-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    WIPWATCH_PROJECT_ROOT      Project root (default: current directory)
    WIPWATCH_PROJECT_NAME      Project name (default: root directory name)
    WIPWATCH_PYTEST            pytest command (default: pytest)
    WIPWATCH_TESTS_PATH        Tests path (default: tests)
    WIPWATCH_WIP_MARK          Marker expression for WIP tests (default: wip)
    WIPWATCH_PORT              HTTP port (default: 8700)
    WIPWATCH_BUFFER_SIZE       Channel capacity (default: 1000)
    WIPWATCH_DEBOUNCE_MS       Debounce interval (default: 100)
    WIPWATCH_RUN_TIMEOUT_SECS  Per-run timeout (default: 300)
    WIPWATCH_STRICT_PARSE      Reject malformed result logs (default: false)
    WIPWATCH_WATCH_EXTENSIONS  Comma-separated extensions (default: py)

EXAMPLES:
    # Watch the current project
    wipwatch-monitor run

    # Use a virtualenv's pytest and JSON logs
    WIPWATCH_PYTEST='.venv/bin/python -m pytest' wipwatch-monitor run --json-logs

    # Inspect a result log
    wipwatch-monitor parse results.log --strict
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the project and re-run WIP tests on every change.
    Run {
        /// Emit logs as JSON lines.
        #[arg(long)]
        json_logs: bool,
    },

    /// Parse a pytest result log and print its records as JSON.
    Parse {
        /// Result log to parse.
        file: PathBuf,

        /// Fail on lines that appear before any test header.
        #[arg(long)]
        strict: bool,
    },

    /// Collect the test inventory once and print it as JSON.
    Collect,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { json_logs } => {
            init_logging(json_logs);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_monitor())
        }
        Command::Parse { file, strict } => {
            init_logging(false);
            run_parse(&file, strict)
        }
        Command::Collect => {
            init_logging(false);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_collect())
        }
    }
}

async fn run_monitor() -> Result<()> {
    info!("Starting wipwatch Monitor");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        project = %config.project_name,
        root = %config.project_root.display(),
        pytest = ?config.pytest_command,
        tests_path = %config.tests_path,
        port = config.port,
        "Configuration loaded"
    );

    let hub = LocalHub::with_capacity(config.buffer_size);
    let sink: Arc<dyn RecordSink> = Arc::new(hub.clone());
    let runner = PytestRunner::from_config(&config).context("Invalid pytest command")?;

    // Subscribe before the watcher starts so no early change is missed.
    let wip_events = hub.subscribe(modified_pyfiles(&config));
    let test_events = hub.subscribe(modified_testfiles(&config));

    let wip_task = tokio::spawn(run_wip_tests(
        wip_events,
        runner.clone(),
        Arc::clone(&sink),
        config.project_name.clone(),
    ));
    let get_tests_task = tokio::spawn(run_get_tests(
        test_events,
        runner,
        Arc::clone(&sink),
        config.project_name.clone(),
    ));

    let watcher =
        SourceWatcher::start(&config, hub.clone()).context("Failed to start source watcher")?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    let app = create_router(AppState::new(config, hub));
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
    {
        error!(error = %err, "HTTP server error");
    }

    info!("Shutting down");
    drop(watcher);
    wip_task.abort();
    get_tests_task.abort();

    info!("Monitor shutdown complete");
    Ok(())
}

fn run_parse(file: &Path, strict: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    let parser = if strict {
        ResultLogParser::strict()
    } else {
        ResultLogParser::new()
    };
    let parsed = parser
        .parse(&content)
        .with_context(|| format!("Rejected result log {}", file.display()))?;

    for warning in &parsed.warnings {
        warn!(%warning, "Result log anomaly");
    }

    println!("{}", serde_json::to_string_pretty(&parsed.records)?);
    Ok(())
}

async fn run_collect() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let runner = PytestRunner::from_config(&config).context("Invalid pytest command")?;

    let tests = runner.collect().await.context("Failed to collect tests")?;
    println!("{}", serde_json::to_string_pretty(&tests)?);
    Ok(())
}

/// Initializes logging to stderr, as plain text or JSON lines.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
