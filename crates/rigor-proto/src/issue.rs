//! Recorded issues.
//!
//! Every failure a test case reports, whether an assertion, a thrown error or a
//! misuse of the framework, is an [`Issue`]. The kind decides whether the issue
//! counts as an expected (assertion-style) failure or an unexpected one.

use crate::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// An explicit check failed.
    AssertionFailure,

    /// The body, set-up or a teardown block returned an error.
    ThrownError,

    /// The framework itself was misused (double fulfil, empty wait, ...).
    ApiViolation,

    /// A strict expect-failure scope closed without matching any issue.
    UnmatchedExpectedFailure,

    /// Measurements varied more than allowed.
    PerformanceRegression,
}

impl IssueKind {
    /// Returns true for assertion-style failures.
    ///
    /// Unexpected issues feed the separate "unexpected" counter.
    pub fn is_expected(self) -> bool {
        matches!(
            self,
            IssueKind::AssertionFailure
                | IssueKind::UnmatchedExpectedFailure
                | IssueKind::PerformanceRegression
        )
    }

    /// Human-readable name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::AssertionFailure => "Assertion Failure",
            IssueKind::ThrownError => "Thrown Error",
            IssueKind::ApiViolation => "API Violation",
            IssueKind::UnmatchedExpectedFailure => "Unmatched Expected Failure",
            IssueKind::PerformanceRegression => "Performance Regression",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,

    /// One-line description, printed by reporters.
    pub compact_description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,

    /// Rendered form of the error that caused the issue, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_error: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, compact_description: impl Into<String>) -> Self {
        Self {
            kind,
            compact_description: compact_description.into(),
            location: None,
            associated_error: None,
        }
    }

    pub fn assertion_failure(description: impl Into<String>) -> Self {
        Self::new(IssueKind::AssertionFailure, description)
    }

    pub fn api_violation(description: impl Into<String>) -> Self {
        Self::new(IssueKind::ApiViolation, description)
    }

    /// Issue for an error that escaped a test body.
    ///
    /// Located at the `<EXPR>:0` sentinel since the throw site is unknown.
    pub fn thrown_error(error: &anyhow::Error) -> Self {
        let rendered = error.to_string();
        Self::new(IssueKind::ThrownError, format!("threw error \"{rendered}\""))
            .with_location(SourceLocation::expression())
            .with_associated_error(rendered)
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_associated_error(mut self, error: impl Into<String>) -> Self {
        self.associated_error = Some(error.into());
        self
    }

    pub fn is_expected(&self) -> bool {
        self.kind.is_expected()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.compact_description)
    }
}
