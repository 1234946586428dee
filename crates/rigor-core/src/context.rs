//! The per-test view handed to set-up, body and tear-down.
//!
//! A [`TestContext`] borrows the [`RunEnvironment`] for the duration of one
//! test case. Everything a test does with the engine goes through it: record
//! failures, create expectations and wait for them, register teardown blocks,
//! declare expected failures, skip, measure.
//!
//! # Example
//!
//! ```
//! use rigor_core::{RunEnvironment, TestCase};
//! use std::time::Duration;
//!
//! let case = TestCase::new("NetworkTests", "test_fetch", |ctx| {
//!     let done = ctx.expectation("response arrives");
//!     let remote = done.clone();
//!     std::thread::spawn(move || remote.fulfill());
//!     ctx.wait(&[done], Duration::from_secs(5));
//!     Ok(())
//! });
//!
//! let env = RunEnvironment::default();
//! assert!(case.run(&env).has_succeeded());
//! ```

use crate::config::RigorConfig;
use crate::env::RunEnvironment;
use crate::expectation::Expectation;
use crate::expected_failure::{ContextId, ExpectedFailureOptions};
use crate::notification::{self, NotificationCenter, NotificationHandler};
use crate::performance::PerformanceMeter;
use crate::predicate::{self, Predicate, PredicateHandler};
use crate::run_loop::{MainQueue, RunLoop};
use crate::subsystem::CaseHandle;
use crate::waiter::{WaitResult, Waiter, WaiterDelegate};
use rigor_proto::{Issue, SourceLocation, Skip, TestError, TestResult, WaitError};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Where a test case is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePhase {
    Created,
    SetUp,
    Running,
    TearDown,
    Finished,
}

/// Engine access for one running test case.
pub struct TestContext<'env> {
    env: &'env RunEnvironment,
    handle: CaseHandle,
    name: String,
    phase: CasePhase,
    pub(crate) meter: PerformanceMeter,
}

impl<'env> TestContext<'env> {
    pub(crate) fn new(env: &'env RunEnvironment, handle: CaseHandle, name: String) -> Self {
        Self {
            env,
            handle,
            name,
            phase: CasePhase::Created,
            meter: PerformanceMeter::default(),
        }
    }

    /// `Class.method`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> CasePhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: CasePhase) {
        tracing::trace!(test = %self.name, ?phase, "test case phase");
        self.phase = phase;
    }

    /// A sendable handle for recording against this case from other threads.
    pub fn handle(&self) -> &CaseHandle {
        &self.handle
    }

    pub fn config(&self) -> &RigorConfig {
        self.env.config()
    }

    pub fn run_loop(&self) -> &RunLoop {
        self.env.run_loop()
    }

    pub fn main_queue(&self) -> MainQueue {
        self.env.run_loop().main_queue()
    }

    pub fn notification_center(&self) -> &Arc<NotificationCenter> {
        self.env.notification_center()
    }

    pub(crate) fn env(&self) -> &'env RunEnvironment {
        self.env
    }

    // ---- failures ----------------------------------------------------------

    pub fn continue_after_failure(&self) -> bool {
        self.handle.subsystem().continue_after_failure(self.handle.id())
    }

    /// When false, the first recorded failure makes later checks return
    /// [`TestError::Stopped`].
    pub fn set_continue_after_failure(&mut self, value: bool) {
        self.handle
            .subsystem()
            .set_continue_after_failure(self.handle.id(), value);
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_stopped()
    }

    /// `Err(Stopped)` once a failure has stopped the test, `Ok` otherwise.
    pub fn ensure_not_stopped(&self) -> TestResult {
        if self.is_stopped() {
            Err(TestError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Records `issue` against this test case.
    pub fn record_issue(&mut self, issue: Issue) -> TestResult {
        self.handle.record_issue(issue);
        self.ensure_not_stopped()
    }

    /// Records an assertion failure located at the caller.
    #[track_caller]
    pub fn record_failure(&mut self, description: impl Into<String>) -> TestResult {
        self.record_issue(
            Issue::assertion_failure(description).with_location(SourceLocation::caller()),
        )
    }

    pub(crate) fn total_failure_count(&self) -> usize {
        self.handle
            .subsystem()
            .total_failure_count(self.handle.id())
    }

    // ---- expectations ------------------------------------------------------

    /// Creates an expectation owned by this test case.
    #[track_caller]
    pub fn expectation(&mut self, description: impl Into<String>) -> Expectation {
        self.create_expectation(description.into(), SourceLocation::caller(), false)
    }

    /// Creates an expectation that fails the wait if it is fulfilled.
    #[track_caller]
    pub fn inverted_expectation(&mut self, description: impl Into<String>) -> Expectation {
        self.create_expectation(description.into(), SourceLocation::caller(), true)
    }

    fn create_expectation(
        &mut self,
        description: String,
        location: SourceLocation,
        inverted: bool,
    ) -> Expectation {
        Expectation::create(
            self.handle.subsystem(),
            Some(self.handle.id()),
            description,
            location,
            inverted,
        )
    }

    /// Expectation fulfilled once `predicate` holds for `target`.
    ///
    /// The predicate is checked right away and then every
    /// `predicate_interval_ms` on the run loop. A `handler`, when given,
    /// decides whether a satisfied predicate fulfils the expectation.
    #[track_caller]
    pub fn expectation_for_predicate<T: Debug + 'static>(
        &mut self,
        target: T,
        predicate: Predicate<T>,
        handler: Option<PredicateHandler>,
    ) -> Expectation {
        let location = SourceLocation::caller();
        let description = predicate::predicate_description(&predicate, &target);
        let expectation = self.create_expectation(description, location, false);
        predicate::observe_predicate(
            self.env.run_loop(),
            self.config().predicate_interval(),
            &expectation,
            target,
            predicate,
            handler,
        );
        expectation
    }

    /// Expectation fulfilled by a notification called `name`, optionally only
    /// one posted by `object`.
    #[track_caller]
    pub fn expectation_for_notification(
        &mut self,
        name: &str,
        object: Option<&str>,
        handler: Option<NotificationHandler>,
    ) -> Expectation {
        let location = SourceLocation::caller();
        let description = notification::notification_description(name, object);
        let expectation = self.create_expectation(description, location, false);
        notification::observe_notification(
            self.env.notification_center(),
            &expectation,
            name,
            object,
            handler,
        );
        expectation
    }

    // ---- waiting -----------------------------------------------------------

    /// Waits for `expectations`, recording any failure against this test.
    #[track_caller]
    pub fn wait(&mut self, expectations: &[Expectation], timeout: Duration) -> WaitResult {
        self.wait_at(expectations, timeout, false, SourceLocation::caller())
    }

    /// Like [`wait`](Self::wait), and the expectations must be fulfilled in
    /// the order given.
    #[track_caller]
    pub fn wait_enforcing_order(
        &mut self,
        expectations: &[Expectation],
        timeout: Duration,
    ) -> WaitResult {
        self.wait_at(expectations, timeout, true, SourceLocation::caller())
    }

    /// Waits for every expectation of this test not yet waited for.
    #[track_caller]
    pub fn wait_for_expectations(&mut self, timeout: Duration) -> Option<WaitError> {
        let location = SourceLocation::caller();
        let live = self
            .handle
            .subsystem()
            .live_expectations(self.handle.id());
        self.wait_at(&live, timeout, false, location).wait_error()
    }

    /// Like [`wait_for_expectations`](Self::wait_for_expectations), handing
    /// the outcome to `handler`, which is always called.
    #[track_caller]
    pub fn wait_for_expectations_with_handler(
        &mut self,
        timeout: Duration,
        handler: impl FnOnce(Option<WaitError>),
    ) {
        let error = self.wait_for_expectations(timeout);
        handler(error);
    }

    fn wait_at(
        &mut self,
        expectations: &[Expectation],
        timeout: Duration,
        enforce_order: bool,
        location: SourceLocation,
    ) -> WaitResult {
        let case = self.handle.id();
        let subsystem = Arc::clone(self.handle.subsystem());

        if expectations.is_empty() {
            self.handle.record_issue(
                Issue::api_violation(
                    "API violation - call made to wait without any expectations having been set.",
                )
                .with_location(location),
            );
            return WaitResult::Completed;
        }
        if !subsystem.begin_wait(case) {
            self.handle.record_issue(
                Issue::api_violation(
                    "API violation - calling wait on a test case while already waiting.",
                )
                .with_location(location),
            );
            return WaitResult::Completed;
        }

        let mut waiter = Waiter::new()
            .with_poll_interval(self.config().poll_interval())
            .with_delegate(CaseWaiterDelegate {
                handle: self.handle.clone(),
                location,
            });
        let result = match waiter.wait(self.env.run_loop(), expectations, timeout, enforce_order) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(test = %self.name, %err, "wait could not start");
                WaitResult::Completed
            }
        };

        subsystem.end_wait(case, expectations);
        for expectation in expectations {
            expectation.clean_up();
        }
        result
    }

    // ---- teardown ----------------------------------------------------------

    /// Registers a block to run after the test, newest first.
    ///
    /// # Panics
    ///
    /// Panics when called after teardown blocks have been dequeued.
    pub fn add_teardown_block(&mut self, block: impl FnOnce() -> TestResult + Send + 'static) {
        self.handle.add_teardown_block(block);
    }

    // ---- expected failures -------------------------------------------------

    /// Runs `body` with issues matching `options` treated as expected.
    ///
    /// The context is popped when `body` returns, unwinding included. A
    /// strict context that matched nothing records a failure at that point.
    #[track_caller]
    pub fn expect_failure<R>(
        &mut self,
        reason: impl Into<String>,
        options: ExpectedFailureOptions,
        body: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let location = SourceLocation::caller();
        let id = self.handle.subsystem().push_expected_failure(
            self.handle.id(),
            Some(reason.into()),
            options,
            location,
        );
        let _pop = scopeguard::guard(self.handle.clone(), move |handle| {
            handle.subsystem().pop_expected_failure(handle.id(), id);
        });
        body(self)
    }

    /// Treats matching issues as expected until the test case ends.
    #[track_caller]
    pub fn expect_failure_until_end(
        &mut self,
        reason: impl Into<String>,
        options: ExpectedFailureOptions,
    ) -> ContextId {
        self.handle.subsystem().push_expected_failure(
            self.handle.id(),
            Some(reason.into()),
            options,
            SourceLocation::caller(),
        )
    }

    // ---- skipping ----------------------------------------------------------

    /// Skip signal to return from set-up or the body: `return Err(ctx.skip(..))`.
    #[track_caller]
    pub fn skip(&self, message: impl Into<String>) -> TestError {
        Skip::new(Some(message.into())).into()
    }

    /// Skips when `condition` is true.
    #[track_caller]
    pub fn skip_if(&self, condition: bool, message: impl Into<String>) -> TestResult {
        if condition {
            return Err(Skip::required(false, Some(message.into())).into());
        }
        Ok(())
    }

    /// Skips when `condition` is false.
    #[track_caller]
    pub fn skip_unless(&self, condition: bool, message: impl Into<String>) -> TestResult {
        if !condition {
            return Err(Skip::required(true, Some(message.into())).into());
        }
        Ok(())
    }
}

impl Debug for TestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Records wait failures against the waiting test case, at the wait call site.
struct CaseWaiterDelegate {
    handle: CaseHandle,
    location: SourceLocation,
}

impl CaseWaiterDelegate {
    fn fail(&self, description: String) {
        self.handle
            .record_issue(Issue::assertion_failure(description).with_location(self.location.clone()));
    }
}

impl WaiterDelegate for CaseWaiterDelegate {
    fn did_timeout(&mut self, timeout: Duration, unfulfilled: &[Expectation]) {
        let names: Vec<&str> = unfulfilled.iter().map(Expectation::description).collect();
        self.fail(format!(
            "Asynchronous wait failed - Exceeded timeout of {:?} seconds, with unfulfilled expectations: {}",
            timeout.as_secs_f64(),
            names.join(", ")
        ));
    }

    fn did_fulfill_inverted(&mut self, expectation: &Expectation) {
        self.fail(format!(
            "Fulfilled inverted expectation '{}'",
            expectation.description()
        ));
    }

    fn did_violate_ordering(&mut self, fulfilled: &Expectation, required: &Expectation) {
        self.fail(format!(
            "Failed due to expectation fulfilled in incorrect order: requires '{}', actually fulfilled '{}'",
            required.description(),
            fulfilled.description()
        ));
    }
}
