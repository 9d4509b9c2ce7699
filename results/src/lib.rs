//! wipwatch Results - pytest output parsing.
//!
//! This crate turns the text pytest writes into structured records. It has no
//! I/O and no async code: callers read the output first, then hand the whole
//! string to a parser.
//!
//! # Modules
//!
//! - [`result_log`]: pytest `--result-log` parsing into [`ResultRecord`]s
//! - [`collect`]: `pytest --collect-only` listing into [`CollectedTest`]s
//! - [`outcome`]: Classification of single-character result codes
//! - [`error`]: Error types for strict parsing
//!
//! # Example
//!
//! ```
//! use wipwatch_results::parse_result_log;
//!
//! let log = "F tests/test_a.py::TestX::test_one\n detail\n. tests/test_b.py::test_two";
//! let records = parse_result_log(log);
//!
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].class.as_deref(), Some("TestX"));
//! assert_eq!(records[0].message, "detail");
//! assert_eq!(records[1].class, None);
//! ```

pub mod collect;
pub mod error;
pub mod outcome;
pub mod result_log;

pub use collect::{parse_collect_output, CollectedTest};
pub use error::ResultLogError;
pub use outcome::Outcome;
pub use result_log::{parse_result_log, ParseWarning, ParsedLog, ResultLogParser, ResultRecord};
