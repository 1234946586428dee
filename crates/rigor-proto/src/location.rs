//! File/line provenance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source position attached to issues, skips and expectations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Path of the source file, as reported by the compiler.
    pub file: String,

    /// 1-based line number, or 0 when unknown.
    pub line: u32,
}

impl SourceLocation {
    /// File name used when an error escapes a test body.
    pub const EXPRESSION_FILE: &'static str = "<EXPR>";

    /// File name printed when an issue has no location.
    pub const UNKNOWN_FILE: &'static str = "<unknown>";

    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Location of the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self::new(location.file(), location.line())
    }

    /// Sentinel location for errors thrown out of a test body.
    pub fn expression() -> Self {
        Self::new(Self::EXPRESSION_FILE, 0)
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN_FILE, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_captures_this_file() {
        let location = SourceLocation::caller();
        assert!(location.file.ends_with("location.rs"));
        assert!(location.line > 0);
    }

    #[test]
    fn test_sentinels_display() {
        assert_eq!(SourceLocation::expression().to_string(), "<EXPR>:0");
        assert_eq!(SourceLocation::unknown().to_string(), "<unknown>:0");
    }
}
