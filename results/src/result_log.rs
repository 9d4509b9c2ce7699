//! pytest result-log parsing.
//!
//! pytest's `--result-log` option writes one header line per test followed by
//! zero or more message lines:
//!
//! ```text
//! F tests/test_a.py::TestX::test_one
//!  def test_one():
//!  >       assert False
//! . tests/test_b.py::test_two
//! ```
//!
//! A header is a single-character result code, one whitespace character, then
//! `<file>::<class>::<function>` where the class segment is optional. Every
//! other line is a message line belonging to the last header; its first
//! character is a formatting prefix (normally a space) and is dropped.
//!
//! # Anomalies
//!
//! Lines that cannot belong to any record (message lines before the first
//! header) are never attached to a record. The default parser reports them as
//! [`ParseWarning::OrphanLine`]; [`ResultLogParser::strict`] turns them into a
//! [`ResultLogError`].

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ResultLogError;

/// Header line pattern: `<code><ws><file>::[<class>::]<function>`.
///
/// `file` and `class` are non-greedy, so the file ends at the first `::` and
/// everything after the optional class segment is the function.
static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<result>\S)\s(?P<file>.*?)::(?:(?P<class>.*?)::)?(?P<function>.*?)$")
        .expect("header pattern is a valid regex")
});

/// One test outcome from a result log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Result code exactly as pytest wrote it (`.`, `F`, `E`, `s`, ...).
    pub result: char,

    /// Path of the test file.
    pub file: String,

    /// Test class, when the test lives in one.
    pub class: Option<String>,

    /// Test function name, including any parametrization suffix.
    pub function: String,

    /// Message lines joined with `\n`, each without its prefix character.
    pub message: String,
}

impl ResultRecord {
    fn from_header(caps: &Captures<'_>) -> Option<Self> {
        let result = caps.name("result")?.as_str().chars().next()?;

        Some(Self {
            result,
            file: caps.name("file")?.as_str().to_string(),
            class: caps.name("class").map(|m| m.as_str().to_string()),
            function: caps.name("function")?.as_str().to_string(),
            message: String::new(),
        })
    }
}

/// A non-fatal anomaly found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// A message line appeared before any header and was dropped.
    OrphanLine { line_number: usize, line: String },

    /// A message line started with something other than a space. The
    /// character was still dropped.
    UnexpectedPrefix { line_number: usize, prefix: char },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanLine { line_number, line } => {
                write!(f, "line {line_number}: dropped message line before any header: {line:?}")
            }
            Self::UnexpectedPrefix {
                line_number,
                prefix,
            } => write!(f, "line {line_number}: unexpected message prefix {prefix:?}"),
        }
    }
}

/// Output of a single parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLog {
    /// Records in file order.
    pub records: Vec<ResultRecord>,

    /// Anomalies, in the order they were found.
    pub warnings: Vec<ParseWarning>,
}

/// Line-oriented parser for pytest result logs.
///
/// The parser holds no state between calls; one instance can parse any
/// number of logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultLogParser {
    strict: bool,
}

impl ResultLogParser {
    /// Creates a permissive parser that reports anomalies as warnings.
    #[must_use]
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Creates a parser that rejects message lines appearing before any header.
    #[must_use]
    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Returns `true` if this parser rejects orphan lines.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Parses the full content of a result log.
    ///
    /// # Errors
    ///
    /// Only a strict parser fails, with [`ResultLogError::OrphanLine`] for the
    /// first message line that precedes every header.
    pub fn parse(&self, content: &str) -> Result<ParsedLog, ResultLogError> {
        let mut log = ParsedLog::default();
        let mut current: Option<ResultRecord> = None;
        let mut last_message: Vec<&str> = Vec::new();

        for (index, line) in split_lines(content).enumerate() {
            let line_number = index + 1;

            if let Some(record) = HEADER_PATTERN
                .captures(line)
                .and_then(|caps| ResultRecord::from_header(&caps))
            {
                if let Some(open) = current.take() {
                    log.records.push(close(open, &last_message));
                    last_message.clear();
                }
                current = Some(record);
                continue;
            }

            if current.is_none() {
                if self.strict {
                    return Err(ResultLogError::OrphanLine {
                        line_number,
                        line: line.to_string(),
                    });
                }
                log.warnings.push(ParseWarning::OrphanLine {
                    line_number,
                    line: line.to_string(),
                });
                continue;
            }

            let mut chars = line.chars();
            if let Some(prefix) = chars.next().filter(|c| *c != ' ') {
                log.warnings.push(ParseWarning::UnexpectedPrefix {
                    line_number,
                    prefix,
                });
            }
            last_message.push(chars.as_str());
        }

        if let Some(open) = current {
            log.records.push(close(open, &last_message));
        }

        debug!(
            records = log.records.len(),
            warnings = log.warnings.len(),
            strict = self.strict,
            "Parsed result log"
        );

        Ok(log)
    }
}

/// Characters that end a line on their own, besides `\r\n`.
const LINE_BREAKS: &[char] = &[
    '\n', '\r', '\u{0b}', '\u{0c}', '\u{1c}', '\u{1d}', '\u{1e}', '\u{85}', '\u{2028}',
    '\u{2029}',
];

/// Splits on every Unicode line boundary, not only `\n` and `\r\n`.
///
/// A trailing line break does not produce a final empty line.
fn split_lines(content: &str) -> impl Iterator<Item = &str> {
    let mut rest = content;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(LINE_BREAKS) {
            Some(end) => {
                let line = &rest[..end];
                let tail = &rest[end..];
                let break_len = if tail.starts_with("\r\n") {
                    2
                } else {
                    tail.chars().next().map_or(1, char::len_utf8)
                };
                rest = &tail[break_len..];
                Some(line)
            }
            None => Some(std::mem::take(&mut rest)),
        }
    })
}

fn close(mut record: ResultRecord, message: &[&str]) -> ResultRecord {
    record.message = message.join("\n");
    record
}

/// Parses a result log permissively and returns only the records.
///
/// # Example
///
/// ```
/// use wipwatch_results::parse_result_log;
///
/// let records = parse_result_log("s tests/test_c.py::test_skipped\n skipped: no db");
/// assert_eq!(records[0].result, 's');
/// assert_eq!(records[0].message, "skipped: no db");
/// ```
#[must_use]
pub fn parse_result_log(content: &str) -> Vec<ResultRecord> {
    // The permissive parser has no failure path.
    ResultLogParser::new()
        .parse(content)
        .map(|log| log.records)
        .unwrap_or_default()
}
