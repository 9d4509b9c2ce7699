//! Configuration module for wipwatch Monitor.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `WIPWATCH_PROJECT_ROOT` | No | current dir | Source tree to watch; pytest runs here |
//! | `WIPWATCH_PROJECT_NAME` | No | root dir name | Project name on published records |
//! | `WIPWATCH_PYTEST` | No | `pytest` | pytest command line (whitespace-split) |
//! | `WIPWATCH_TESTS_PATH` | No | `tests` | Tests directory, relative to the root |
//! | `WIPWATCH_WIP_MARK` | No | `wip` | Marker expression selecting WIP tests |
//! | `WIPWATCH_PORT` | No | 8700 | HTTP port |
//! | `WIPWATCH_BUFFER_SIZE` | No | 1000 | Channel capacity |
//! | `WIPWATCH_DEBOUNCE_MS` | No | 100 | Quiet period before a change is handled |
//! | `WIPWATCH_RUN_TIMEOUT_SECS` | No | 300 | Maximum duration of one pytest run |
//! | `WIPWATCH_STRICT_PARSE` | No | false | Reject malformed result logs |
//! | `WIPWATCH_WATCH_EXTENSIONS` | No | `py` | Comma-separated extensions to watch |
//!
//! # Example
//!
//! ```no_run
//! use wipwatch_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Watching: {}", config.project_root.display());
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default pytest command.
const DEFAULT_PYTEST: &str = "pytest";

/// Default tests directory.
const DEFAULT_TESTS_PATH: &str = "tests";

/// Default WIP marker.
const DEFAULT_WIP_MARK: &str = "wip";

/// Default HTTP port.
const DEFAULT_PORT: u16 = 8700;

/// Default channel capacity.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default debounce interval in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default pytest run timeout in seconds.
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 300;

/// Default watched extension.
const DEFAULT_WATCH_EXTENSION: &str = "py";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The project root was not given and the working directory is unusable.
    #[error("failed to determine project root: {0}")]
    NoProjectRoot(#[source] std::io::Error),
}

/// Configuration for the wipwatch Monitor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the source tree being watched.
    pub project_root: PathBuf,

    /// Project name attached to every record.
    pub project_name: String,

    /// pytest program followed by any fixed leading arguments.
    pub pytest_command: Vec<String>,

    /// Tests directory relative to the project root. File keys under this
    /// prefix trigger re-collection.
    pub tests_path: String,

    /// Marker expression passed to `pytest -m`.
    pub wip_mark: String,

    /// HTTP port for the route server.
    pub port: u16,

    /// Capacity of internal channels.
    pub buffer_size: usize,

    /// Quiet period per file before a change is handled.
    pub debounce: Duration,

    /// Maximum duration of a single pytest invocation.
    pub run_timeout: Duration,

    /// Whether result logs are parsed strictly.
    pub strict_parse: bool,

    /// File extensions (without the dot) the watcher reports.
    pub watch_extensions: Vec<String>,
}

impl Config {
    /// Creates a configuration for `project_root` with every other setting at
    /// its default.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, project_name: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            project_name: project_name.into(),
            pytest_command: vec![DEFAULT_PYTEST.to_string()],
            tests_path: DEFAULT_TESTS_PATH.to_string(),
            wip_mark: DEFAULT_WIP_MARK.to_string(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            strict_parse: false,
            watch_extensions: vec![DEFAULT_WATCH_EXTENSION.to_string()],
        }
    }

    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - a numeric variable is not a positive integer
    /// - `WIPWATCH_PYTEST` is set but empty
    /// - `WIPWATCH_STRICT_PARSE` is not a boolean
    /// - no project root is given and the working directory cannot be read
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: WIPWATCH_PROJECT_ROOT (default: current directory)
        let project_root = match env::var("WIPWATCH_PROJECT_ROOT") {
            Ok(root) => PathBuf::from(root),
            Err(_) => env::current_dir().map_err(ConfigError::NoProjectRoot)?,
        };

        // Optional: WIPWATCH_PROJECT_NAME (default: root directory name)
        let project_name = env::var("WIPWATCH_PROJECT_NAME")
            .unwrap_or_else(|_| default_project_name(&project_root));

        let mut config = Self::new(project_root, project_name);

        if let Ok(val) = env::var("WIPWATCH_PYTEST") {
            let command: Vec<String> = val.split_whitespace().map(str::to_string).collect();
            if command.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "WIPWATCH_PYTEST".to_string(),
                    message: "pytest command cannot be empty".to_string(),
                });
            }
            config.pytest_command = command;
        }

        if let Ok(val) = env::var("WIPWATCH_TESTS_PATH") {
            config.tests_path = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = env::var("WIPWATCH_WIP_MARK") {
            config.wip_mark = val;
        }

        config.port = parse_positive("WIPWATCH_PORT", DEFAULT_PORT)?;
        config.buffer_size = parse_positive("WIPWATCH_BUFFER_SIZE", DEFAULT_BUFFER_SIZE)?;
        config.debounce = Duration::from_millis(parse_positive(
            "WIPWATCH_DEBOUNCE_MS",
            DEFAULT_DEBOUNCE_MS,
        )?);
        config.run_timeout = Duration::from_secs(parse_positive(
            "WIPWATCH_RUN_TIMEOUT_SECS",
            DEFAULT_RUN_TIMEOUT_SECS,
        )?);

        config.strict_parse = match env::var("WIPWATCH_STRICT_PARSE") {
            Ok(val) => parse_bool("WIPWATCH_STRICT_PARSE", &val)?,
            Err(_) => false,
        };

        // Optional: WIPWATCH_WATCH_EXTENSIONS (default: py)
        if let Ok(val) = env::var("WIPWATCH_WATCH_EXTENSIONS") {
            let extensions: Vec<String> = val
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !extensions.is_empty() {
                config.watch_extensions = extensions;
            }
        }

        Ok(config)
    }
}

/// Parses a numeric variable that must be greater than zero.
fn parse_positive<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let Ok(val) = env::var(key) else {
        return Ok(default);
    };

    let parsed = val.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected positive integer, got '{val}'"),
    })?;

    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }

    Ok(parsed)
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{val}'"),
        }),
    }
}

/// Uses the root directory's name, falling back to "project".
fn default_project_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(root)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "project".to_string())
}
