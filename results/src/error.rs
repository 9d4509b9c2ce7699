//! Error types for result parsing.

use thiserror::Error;

/// Errors raised by a strict [`ResultLogParser`](crate::ResultLogParser).
///
/// The permissive parser never fails; it reports the same conditions as
/// [`ParseWarning`](crate::ParseWarning)s instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultLogError {
    /// A message line appeared before any header line.
    #[error("line {line_number}: message line before any test header: {line:?}")]
    OrphanLine {
        /// 1-based line number in the log.
        line_number: usize,
        /// The offending line, unmodified.
        line: String,
    },
}
