//! Result code classification.

use serde::Serialize;

/// What a result-log code means.
///
/// Records keep the raw code; this is only for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    Error,
    Skipped,
    XFailed,
    XPassed,
    Other(char),
}

impl Outcome {
    /// Maps a pytest result-log code to an outcome.
    #[must_use]
    pub fn from_code(code: char) -> Self {
        match code {
            '.' => Self::Passed,
            'F' => Self::Failed,
            'E' => Self::Error,
            's' => Self::Skipped,
            'x' => Self::XFailed,
            'X' => Self::XPassed,
            other => Self::Other(other),
        }
    }

    /// Returns `true` for outcomes that make a run fail.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(Outcome::from_code('.'), Outcome::Passed);
        assert_eq!(Outcome::from_code('F'), Outcome::Failed);
        assert_eq!(Outcome::from_code('E'), Outcome::Error);
        assert_eq!(Outcome::from_code('s'), Outcome::Skipped);
        assert_eq!(Outcome::from_code('x'), Outcome::XFailed);
        assert_eq!(Outcome::from_code('X'), Outcome::XPassed);
    }

    #[test]
    fn unknown_code_is_carried() {
        assert_eq!(Outcome::from_code('P'), Outcome::Other('P'));
        assert!(!Outcome::from_code('P').is_failure());
    }

    #[test]
    fn failures() {
        assert!(Outcome::Failed.is_failure());
        assert!(Outcome::Error.is_failure());
        assert!(!Outcome::XFailed.is_failure());
    }
}
