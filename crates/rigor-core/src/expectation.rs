//! Fulfillable condition tokens.
//!
//! An [`Expectation`] is a cheap, cloneable handle. Its fulfillment state
//! lives in the run's [`Subsystem`](crate::subsystem::Subsystem) table, behind
//! the same lock as everything else a background thread can touch, and its
//! owning test case is referenced by [`CaseId`] only. Once the owning case has
//! finished, the table entry is gone and [`Expectation::fulfill`] does nothing.

use crate::run_loop::MainQueue;
use crate::subsystem::{CaseId, Subsystem};
use parking_lot::Mutex;
use rigor_proto::{Issue, SourceLocation};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXPECTATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identity of an expectation. Increases with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpectationId(u64);

impl ExpectationId {
    fn next() -> Self {
        Self(NEXT_EXPECTATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Hook run when an expectation stops being observed.
pub(crate) type CleanupHook = Box<dyn FnOnce() + Send>;

struct ExpectationInner {
    id: ExpectationId,
    description: String,
    location: SourceLocation,
    inverted: bool,
    owner: Option<CaseId>,
    subsystem: Arc<Subsystem>,
    /// Queues of standalone waiters currently watching this expectation.
    wakers: Mutex<Vec<MainQueue>>,
}

/// A condition a test can wait on.
#[derive(Clone)]
pub struct Expectation {
    inner: Arc<ExpectationInner>,
}

impl Expectation {
    /// Creates an expectation that belongs to no test case.
    ///
    /// Detached expectations work with a standalone [`Waiter`](crate::Waiter).
    /// Misuse such as a double fulfil is logged instead of recorded.
    #[track_caller]
    pub fn new(description: impl Into<String>) -> Self {
        Self::create(
            &Subsystem::detached(),
            None,
            description.into(),
            SourceLocation::caller(),
            false,
        )
    }

    /// Creates a detached expectation that must *not* be fulfilled.
    #[track_caller]
    pub fn inverted(description: impl Into<String>) -> Self {
        Self::create(
            &Subsystem::detached(),
            None,
            description.into(),
            SourceLocation::caller(),
            true,
        )
    }

    pub(crate) fn create(
        subsystem: &Arc<Subsystem>,
        owner: Option<CaseId>,
        description: String,
        location: SourceLocation,
        inverted: bool,
    ) -> Self {
        let expectation = Self {
            inner: Arc::new(ExpectationInner {
                id: ExpectationId::next(),
                description,
                location,
                inverted,
                owner,
                subsystem: Arc::clone(subsystem),
                wakers: Mutex::new(Vec::new()),
            }),
        };
        subsystem.register_expectation(&expectation);
        expectation
    }

    pub fn id(&self) -> ExpectationId {
        self.inner.id
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Where the expectation was created.
    pub fn location(&self) -> &SourceLocation {
        &self.inner.location
    }

    pub fn is_inverted(&self) -> bool {
        self.inner.inverted
    }

    pub(crate) fn owner(&self) -> Option<CaseId> {
        self.inner.owner
    }

    /// Returns true once [`fulfill`](Self::fulfill) has been called.
    ///
    /// Always false after the owning test case has finished.
    pub fn is_fulfilled(&self) -> bool {
        self.fulfillment_sequence().is_some()
    }

    /// Position of this fulfillment in the process-wide fulfillment order.
    pub(crate) fn fulfillment_sequence(&self) -> Option<u64> {
        self.inner.subsystem.fulfillment_sequence(self.inner.id)
    }

    /// Marks the condition as satisfied.
    ///
    /// A second call records an API violation against the owning test case.
    /// Calls made after the owning case has finished are ignored.
    #[track_caller]
    pub fn fulfill(&self) {
        let location = SourceLocation::caller();
        let subsystem = &self.inner.subsystem;

        match subsystem.mark_fulfilled(self.inner.id) {
            FulfillOutcome::Fulfilled => {
                tracing::trace!(expectation = %self.inner.description, "expectation fulfilled");
                for queue in self.inner.wakers.lock().iter() {
                    queue.wake();
                }
            }
            FulfillOutcome::AlreadyFulfilled => {
                let message = format!(
                    "API violation - multiple calls made to fulfill() for {}.",
                    self.inner.description
                );
                match self.inner.owner {
                    Some(case) => {
                        subsystem
                            .record_issue(case, Issue::api_violation(message).with_location(location));
                    }
                    None => tracing::warn!("{message}"),
                }
            }
            FulfillOutcome::Orphaned => {
                tracing::debug!(
                    expectation = %self.inner.description,
                    "ignoring fulfill for expectation of a finished test case"
                );
            }
        }
    }

    /// Wakes `queue` on fulfilment until [`remove_waker`](Self::remove_waker).
    pub(crate) fn add_waker(&self, queue: &MainQueue) {
        self.inner.wakers.lock().push(queue.clone());
    }

    pub(crate) fn remove_waker(&self, queue: &MainQueue) {
        self.inner.wakers.lock().retain(|q| !q.same_queue(queue));
    }

    #[cfg(test)]
    pub(crate) fn waker_count(&self) -> usize {
        self.inner.wakers.lock().len()
    }

    /// Registers a hook to run when the expectation is no longer observed.
    ///
    /// Runs immediately if the expectation has already been cleaned up.
    pub(crate) fn on_cleanup(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner
            .subsystem
            .add_expectation_cleanup(self.inner.id, Box::new(hook));
    }

    /// Runs and discards every registered cleanup hook.
    pub(crate) fn clean_up(&self) {
        self.inner.subsystem.clean_up_expectation(self.inner.id);
    }
}

/// Result of trying to fulfil an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FulfillOutcome {
    Fulfilled,
    AlreadyFulfilled,
    /// The table entry is gone: the owning case has finished.
    Orphaned,
}

impl PartialEq for Expectation {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Expectation {}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("id", &self.inner.id)
            .field("description", &self.inner.description)
            .field("inverted", &self.inner.inverted)
            .field("fulfilled", &self.is_fulfilled())
            .finish()
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_fulfill() {
        let expectation = Expectation::new("ready");
        assert!(!expectation.is_fulfilled());

        expectation.fulfill();
        assert!(expectation.is_fulfilled());

        // A second fulfil on a detached expectation is only logged.
        expectation.fulfill();
        assert!(expectation.is_fulfilled());
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let first = Expectation::new("a");
        let second = Expectation::new("b");
        assert!(first.id() < second.id());
        assert_ne!(first, second);
        assert_eq!(first.clone(), first);
    }

    #[test]
    fn test_location_points_at_creation_site() {
        let expectation = Expectation::new("here");
        assert!(expectation.location().file.ends_with("expectation.rs"));
    }

    #[test]
    fn test_cleanup_hooks_run_once() {
        use std::sync::atomic::AtomicUsize;

        let expectation = Expectation::new("observed");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        expectation.on_cleanup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        expectation.clean_up();
        expectation.clean_up();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fulfillment_sequence_orders_fulfils() {
        let a = Expectation::new("a");
        let b = Expectation::new("b");
        b.fulfill();
        a.fulfill();
        assert!(b.fulfillment_sequence() < a.fulfillment_sequence());
    }
}
