//! Early-exit signals for test bodies and the wait error value.

use crate::SourceLocation;
use std::fmt;

/// Result type returned by test bodies, set-up/tear-down hooks and assertions.
pub type TestResult<T = ()> = Result<T, TestError>;

/// Why a test body stopped before reaching its end.
///
/// Any `std::error::Error` converts into [`TestError::Thrown`] through `?`,
/// so bodies can propagate ordinary errors directly. `TestError` itself does
/// not implement `std::error::Error`, which keeps that blanket conversion
/// coherent.
#[derive(Debug)]
pub enum TestError {
    /// The test asked to be skipped.
    Skip(Skip),

    /// An error escaped the body.
    Thrown(anyhow::Error),

    /// A failure was recorded while continue-after-failure was off.
    Stopped,
}

impl TestError {
    /// Wraps an `anyhow::Error`, which cannot use the blanket `From`.
    pub fn thrown(error: anyhow::Error) -> Self {
        TestError::Thrown(error)
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Skip(skip) => f.write_str(&skip.summary()),
            TestError::Thrown(error) => write!(f, "{error}"),
            TestError::Stopped => f.write_str("test stopped after a failure"),
        }
    }
}

impl From<Skip> for TestError {
    fn from(skip: Skip) -> Self {
        TestError::Skip(skip)
    }
}

impl<E> From<E> for TestError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        TestError::Thrown(anyhow::Error::new(error))
    }
}

/// A request to skip the current test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    /// Machine-generated reason, e.g. "required true value but got false".
    pub explanation: Option<String>,

    /// Message supplied by the test author.
    pub message: Option<String>,

    pub location: SourceLocation,
}

impl Skip {
    /// Skip with an optional author message, located at the caller.
    #[track_caller]
    pub fn new(message: Option<String>) -> Self {
        Self {
            explanation: None,
            message: message.filter(|m| !m.is_empty()),
            location: SourceLocation::caller(),
        }
    }

    /// Skip raised because a condition did not hold the required value.
    #[track_caller]
    pub fn required(required: bool, message: Option<String>) -> Self {
        Self {
            explanation: Some(format!(
                "required {required} value but got {}",
                !required
            )),
            message: message.filter(|m| !m.is_empty()),
            location: SourceLocation::caller(),
        }
    }

    /// Summary line printed by reporters.
    ///
    /// `Test skipped`, optionally followed by `: {explanation}` and ` - {message}`.
    pub fn summary(&self) -> String {
        let mut summary = String::from("Test skipped");
        if let Some(explanation) = &self.explanation {
            summary.push_str(": ");
            summary.push_str(explanation);
        }
        if let Some(message) = &self.message {
            summary.push_str(" - ");
            summary.push_str(message);
        }
        summary
    }
}

/// Error value handed to a wait completion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The wait reached its timeout with expectations still unfulfilled.
    #[error("timed out while waiting for expectations")]
    TimeoutWhileWaiting,

    /// The wait ended on an ordering or inverted-expectation failure.
    #[error("a failure was recorded while waiting for expectations")]
    FailureWhileWaiting,
}

impl WaitError {
    pub const DOMAIN: &'static str = "rigor.WaitErrorDomain";

    pub fn code(self) -> i32 {
        match self {
            WaitError::TimeoutWhileWaiting => 0,
            WaitError::FailureWhileWaiting => 1,
        }
    }
}
