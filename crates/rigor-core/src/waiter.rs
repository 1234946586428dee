//! Blocking waits on expectations.
//!
//! A [`Waiter`] ticks the primary thread's [`RunLoop`] until the expectations
//! it observes are satisfied, a failure condition is detected, or the timeout
//! elapses:
//!
//! ```text
//!   Idle ──wait()──▶ Waiting ──▶ Finished(Completed)
//!                       │    ──▶ Finished(TimedOut)
//!                       │    ──▶ Finished(IncorrectOrder)
//!                       └──  ──▶ Finished(InvertedFulfillment)
//! ```
//!
//! Failures are reported to an optional [`WaiterDelegate`]. Waits started
//! from a test case use a delegate that records them against the case.
//!
//! # Example
//!
//! ```
//! use rigor_core::{Expectation, RunLoop, WaitResult, Waiter};
//! use std::time::Duration;
//!
//! let run_loop = RunLoop::new();
//! let ready = Expectation::new("ready");
//! let remote = ready.clone();
//! std::thread::spawn(move || remote.fulfill());
//!
//! let mut waiter = Waiter::new();
//! let result = waiter
//!     .wait(&run_loop, &[ready], Duration::from_secs(5), false)
//!     .unwrap();
//! assert_eq!(result, WaitResult::Completed);
//! ```

use crate::expectation::Expectation;
use crate::run_loop::{RunLoop, deadline_after};
use rigor_proto::WaitError;
use std::time::{Duration, Instant};

/// How often a waiter re-checks its expectations when nothing wakes it.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Completed,
    TimedOut,
    IncorrectOrder,
    InvertedFulfillment,
}

impl WaitResult {
    /// Error value handed to wait completion handlers.
    pub fn wait_error(self) -> Option<WaitError> {
        match self {
            WaitResult::Completed => None,
            WaitResult::TimedOut => Some(WaitError::TimeoutWhileWaiting),
            WaitResult::IncorrectOrder | WaitResult::InvertedFulfillment => {
                Some(WaitError::FailureWhileWaiting)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Idle,
    Waiting,
    Finished(WaitResult),
}

/// Misuse of a standalone [`Waiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaiterError {
    #[error("wait called without any expectations")]
    NoExpectations,

    #[error("a waiter can only wait once")]
    AlreadyWaited,
}

/// Receives the failures a wait detects.
#[allow(unused_variables)]
pub trait WaiterDelegate {
    /// The timeout elapsed. `unfulfilled` is in creation order.
    fn did_timeout(&mut self, timeout: Duration, unfulfilled: &[Expectation]) {}

    fn did_fulfill_inverted(&mut self, expectation: &Expectation) {}

    /// `fulfilled` was fulfilled where `required` should have been.
    fn did_violate_ordering(&mut self, fulfilled: &Expectation, required: &Expectation) {}
}

enum Evaluation<'a> {
    Pending,
    Completed,
    Inverted(&'a Expectation),
    OutOfOrder {
        fulfilled: &'a Expectation,
        required: &'a Expectation,
    },
}

/// Waits for a set of expectations by ticking a run loop.
pub struct Waiter {
    poll_interval: Duration,
    state: WaiterState,
    delegate: Option<Box<dyn WaiterDelegate>>,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: WaiterState::Idle,
            delegate: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_delegate(mut self, delegate: impl WaiterDelegate + 'static) -> Self {
        self.delegate = Some(Box::new(delegate));
        self
    }

    pub fn state(&self) -> WaiterState {
        self.state
    }

    /// Blocks until `expectations` are satisfied or `timeout` elapses.
    ///
    /// With `enforce_order`, the fulfilled expectations must have been
    /// fulfilled in the order they are passed.
    pub fn wait(
        &mut self,
        run_loop: &RunLoop,
        expectations: &[Expectation],
        timeout: Duration,
        enforce_order: bool,
    ) -> Result<WaitResult, WaiterError> {
        if self.state != WaiterState::Idle {
            return Err(WaiterError::AlreadyWaited);
        }
        if expectations.is_empty() {
            return Err(WaiterError::NoExpectations);
        }

        self.state = WaiterState::Waiting;
        let deadline = deadline_after(Instant::now(), timeout);

        tracing::debug!(
            count = expectations.len(),
            timeout_secs = timeout.as_secs_f64(),
            enforce_order,
            "waiting for expectations"
        );

        let queue = run_loop.main_queue();
        for expectation in expectations {
            expectation.add_waker(&queue);
        }

        let result = loop {
            if let Some(result) = self.check(expectations, enforce_order) {
                break result;
            }
            let now = Instant::now();
            if now >= deadline {
                break self.finish_at_deadline(expectations, enforce_order, timeout);
            }
            run_loop.run_once(self.poll_interval.min(deadline - now));
        };

        for expectation in expectations {
            expectation.remove_waker(&queue);
        }
        tracing::debug!(?result, "wait finished");
        self.state = WaiterState::Finished(result);
        Ok(result)
    }

    /// Evaluates once and reports any failure it finds.
    fn check(&mut self, expectations: &[Expectation], enforce_order: bool) -> Option<WaitResult> {
        match evaluate(expectations, enforce_order) {
            Evaluation::Pending => None,
            Evaluation::Completed => Some(WaitResult::Completed),
            Evaluation::Inverted(expectation) => {
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.did_fulfill_inverted(expectation);
                }
                Some(WaitResult::InvertedFulfillment)
            }
            Evaluation::OutOfOrder {
                fulfilled,
                required,
            } => {
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.did_violate_ordering(fulfilled, required);
                }
                Some(WaitResult::IncorrectOrder)
            }
        }
    }

    fn finish_at_deadline(
        &mut self,
        expectations: &[Expectation],
        enforce_order: bool,
        timeout: Duration,
    ) -> WaitResult {
        if let Some(result) = self.check(expectations, enforce_order) {
            return result;
        }

        let mut unfulfilled: Vec<Expectation> = expectations
            .iter()
            .filter(|e| !e.is_inverted() && !e.is_fulfilled())
            .cloned()
            .collect();
        if unfulfilled.is_empty() {
            // Only inverted expectations were left, and none of them fired.
            return WaitResult::Completed;
        }

        unfulfilled.sort_by_key(Expectation::id);
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.did_timeout(timeout, &unfulfilled);
        }
        WaitResult::TimedOut
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("poll_interval", &self.poll_interval)
            .field("state", &self.state)
            .field("has_delegate", &self.delegate.is_some())
            .finish()
    }
}

fn evaluate(expectations: &[Expectation], enforce_order: bool) -> Evaluation<'_> {
    if let Some(inverted) = expectations
        .iter()
        .find(|e| e.is_inverted() && e.is_fulfilled())
    {
        return Evaluation::Inverted(inverted);
    }

    let regular: Vec<&Expectation> = expectations.iter().filter(|e| !e.is_inverted()).collect();

    if enforce_order {
        let mut fulfilled: Vec<(u64, &Expectation)> = regular
            .iter()
            .filter_map(|e| e.fulfillment_sequence().map(|seq| (seq, *e)))
            .collect();
        fulfilled.sort_by_key(|(seq, _)| *seq);

        for (&(_, actual), &required) in fulfilled.iter().zip(regular.iter()) {
            if actual != required {
                return Evaluation::OutOfOrder {
                    fulfilled: actual,
                    required,
                };
            }
        }
    }

    let has_inverted = regular.len() != expectations.len();
    if !has_inverted && regular.iter().all(|e| e.is_fulfilled()) {
        Evaluation::Completed
    } else {
        Evaluation::Pending
    }
}
