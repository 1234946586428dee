//! # rigor-core
//!
//! Test execution engine for Rigor.
//!
//! This crate provides:
//! - The test case lifecycle (set-up, body, teardown blocks, tear-down)
//! - Expectations and blocking waits driven by an explicit run loop
//! - Expected-failure scopes and skipping
//! - Suites, run records and their aggregated counts
//! - Lifecycle observation for reporters
//! - Test selection, listing and the root suite layout
//! - Performance measurement and assertions
//!
//! # Example
//!
//! ```
//! use rigor_core::{RigorConfig, RunEnvironment, TestCaseEntry, TestFilter, build_root_suite};
//! use std::time::Duration;
//!
//! let entries = vec![TestCaseEntry::new("Checkout")
//!     .test("test_pays", |ctx| {
//!         let paid = ctx.expectation("payment accepted");
//!         let remote = paid.clone();
//!         ctx.main_queue().dispatch(move || remote.fulfill());
//!         ctx.wait(&[paid], Duration::from_secs(1));
//!         Ok(())
//!     })];
//!
//! let env = RunEnvironment::new(RigorConfig::default());
//! let root = build_root_suite(&entries, &TestFilter::All, env.config());
//! let run = env.run_bundle(&root);
//! assert_eq!(run.execution_count(), 1);
//! assert!(run.has_succeeded());
//! ```

mod assertions;
mod config;
mod context;
mod entry;
mod env;
mod expectation;
pub mod expected_failure;
mod filtering;
mod listing;
pub mod notification;
mod observation;
pub mod performance;
mod predicate;
pub mod run_loop;
mod subsystem;
mod suite;
pub mod teardown;
mod test_case;
pub mod test_run;
pub mod waiter;

pub use config::{ConfigError, RigorConfig};
pub use context::{CasePhase, TestContext};
pub use entry::TestCaseEntry;
pub use env::RunEnvironment;
pub use expectation::{Expectation, ExpectationId};
pub use expected_failure::{
    ContextId, ExpectedFailureContext, ExpectedFailureOptions, ExpectedFailureStack, IssueMatcher,
};
pub use filtering::{SelectedTest, TestFilter};
pub use listing::{
    ListedTest, ListingError, build_root_suite, human_readable_listing, json_listing, list_tests,
};
pub use notification::{Notification, NotificationCenter, NotificationHandler, NotificationToken};
pub use observation::{ObservationCenter, ObserverId, TestObserver};
pub use performance::{PerformanceMetric, PerformanceResult};
pub use predicate::{Predicate, PredicateHandler};
pub use run_loop::{MainQueue, RunLoop, TimerControl, TimerHandle};
pub use subsystem::{CaseHandle, CaseId};
pub use suite::{Test, TestSuite};
pub use teardown::{TeardownBlock, TeardownError};
pub use test_case::{Fixture, TestBody, TestCase, TestMethod};
pub use test_run::{CaseRun, RunTimes, SuiteRun, TestRun};
pub use waiter::{DEFAULT_POLL_INTERVAL, WaitResult, Waiter, WaiterDelegate, WaiterError, WaiterState};

pub use rigor_proto::{Issue, IssueKind, Skip, SourceLocation, TestError, TestResult, WaitError};
