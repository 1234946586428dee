//! # rigor-proto
//!
//! Shared vocabulary for the Rigor test engine.
//!
//! This crate provides the types every other Rigor crate speaks:
//! - [`Issue`] and [`IssueKind`], the recorded problems of a test case
//! - [`SourceLocation`], file/line provenance for issues, skips and expectations
//! - [`TestError`] and [`Skip`], the early-exit signals of a test body
//! - [`WaitError`], the value handed to wait completion handlers

mod error;
mod issue;
mod location;

pub use error::{Skip, TestError, TestResult, WaitError};
pub use issue::{Issue, IssueKind};
pub use location::SourceLocation;
