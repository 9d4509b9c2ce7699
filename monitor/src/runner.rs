//! pytest invocations.
//!
//! [`execute`] runs one subprocess with captured output and a timeout.
//! [`PytestRunner`] builds the two invocations the monitor needs on top of it:
//! test collection and a WIP run that writes a result log.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};
use wipwatch_results::{
    parse_collect_output, CollectedTest, Outcome, ParseWarning, ResultLogParser, ResultRecord,
};

use crate::config::Config;

/// Errors from running the test command.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process did not finish in time and was killed.
    #[error("test command timed out after {0:?}")]
    Timeout(Duration),

    /// Waiting on the process or handling its result log failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No program was configured.
    #[error("empty test command")]
    EmptyCommand,
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `-1` if the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` with `args` in `cwd`, capturing stdout and stderr.
///
/// The child is killed if it outlives `timeout`.
///
/// # Errors
///
/// Returns [`RunnerError::Spawn`] if the program cannot be started,
/// [`RunnerError::Timeout`] if it runs too long.
pub async fn execute(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, RunnerError> {
    debug!(program, ?args, cwd = %cwd.display(), "Spawning process");

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunnerError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| RunnerError::Timeout(timeout))??;

    let exit_code = output.status.code().unwrap_or(-1);
    debug!(program, exit_code, "Process finished");

    Ok(ProcessOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Outcome of one WIP test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WipRun {
    pub exit_code: i32,

    /// Parsed result log, in file order. Empty if no log was written or
    /// strict parsing rejected it.
    pub records: Vec<ResultRecord>,

    /// Anomalies reported by permissive parsing.
    pub warnings: Vec<ParseWarning>,
}

/// Runs pytest for a project.
#[derive(Debug, Clone)]
pub struct PytestRunner {
    program: String,
    leading_args: Vec<String>,
    project_root: PathBuf,
    tests_path: String,
    wip_mark: String,
    timeout: Duration,
    parser: ResultLogParser,
}

impl PytestRunner {
    /// Builds a runner from the project configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::EmptyCommand`] if `pytest_command` is empty.
    pub fn from_config(config: &Config) -> Result<Self, RunnerError> {
        let (program, leading_args) = config
            .pytest_command
            .split_first()
            .ok_or(RunnerError::EmptyCommand)?;

        let parser = if config.strict_parse {
            ResultLogParser::strict()
        } else {
            ResultLogParser::new()
        };

        Ok(Self {
            program: program.clone(),
            leading_args: leading_args.to_vec(),
            project_root: config.project_root.clone(),
            tests_path: config.tests_path.clone(),
            wip_mark: config.wip_mark.clone(),
            timeout: config.run_timeout,
            parser,
        })
    }

    /// Collects the test inventory with `pytest --collect-only`.
    ///
    /// # Errors
    ///
    /// Returns an error if pytest cannot be run.
    pub async fn collect(&self) -> Result<Vec<CollectedTest>, RunnerError> {
        let args = self.args(["--collect-only".to_string(), self.tests_path.clone()]);
        let output = execute(&self.program, &args, &self.project_root, self.timeout).await?;

        let tests = parse_collect_output(&output.stdout);
        info!(
            exit_code = output.exit_code,
            tests = tests.len(),
            "Collected tests"
        );
        Ok(tests)
    }

    /// Runs the tests carrying the WIP marker and parses their result log.
    ///
    /// # Errors
    ///
    /// Returns an error if pytest cannot be run or the result log file cannot
    /// be created.
    pub async fn run_wip(&self) -> Result<WipRun, RunnerError> {
        let log_file = tempfile::Builder::new()
            .prefix("wipwatch-")
            .suffix(".log")
            .tempfile()?;

        let args = self.args([
            "-r".to_string(),
            "fesxX".to_string(),
            "-v".to_string(),
            "-m".to_string(),
            self.wip_mark.clone(),
            "--result-log".to_string(),
            log_file.path().to_string_lossy().into_owned(),
            self.tests_path.clone(),
        ]);
        let output = execute(&self.program, &args, &self.project_root, self.timeout).await?;

        // The log is written in pytest's locale encoding, not always UTF-8.
        let content = match tokio::fs::read(log_file.path()).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let (records, warnings) = match self.parser.parse(&content) {
            Ok(parsed) => (parsed.records, parsed.warnings),
            Err(e) => {
                warn!(error = %e, "Rejected result log, reporting no details");
                (Vec::new(), Vec::new())
            }
        };

        for warning in &warnings {
            warn!(%warning, "Result log anomaly");
        }

        let failures = records
            .iter()
            .filter(|record| Outcome::from_code(record.result).is_failure())
            .count();
        info!(
            exit_code = output.exit_code,
            results = records.len(),
            failures,
            "WIP tests finished"
        );

        Ok(WipRun {
            exit_code: output.exit_code,
            records,
            warnings,
        })
    }

    fn args(&self, extra: impl IntoIterator<Item = String>) -> Vec<String> {
        self.leading_args.iter().cloned().chain(extra).collect()
    }
}
