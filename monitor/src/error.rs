//! Error types for the wipwatch Monitor.
//!
//! This module defines the error types used throughout the monitor crate,
//! providing structured error handling with clear, human-readable messages.

use thiserror::Error;

use crate::config::ConfigError;
use crate::hub::HubError;
use crate::runner::RunnerError;
use crate::watcher::WatcherError;

/// Errors that can occur during monitor operations.
///
/// This is the primary error type for the monitor crate, encompassing all
/// possible failure modes.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watching error.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// Test command error.
    #[error("test runner error: {0}")]
    Runner(#[from] RunnerError),

    /// Strict result-log parsing rejected a log.
    #[error("result log error: {0}")]
    ResultLog(#[from] wipwatch_results::ResultLogError),

    /// Hub error.
    #[error("hub error: {0}")]
    Hub(#[from] HubError),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
