//! Lifecycle observers.
//!
//! Reporters implement [`TestObserver`] and register with the run's
//! [`ObservationCenter`]. Every event has an empty default, so an observer
//! only overrides what it cares about.
//!
//! Observers are kept in a map keyed by [`ObserverId`]; the order in which
//! they are called is unspecified. `case_did_fail` may arrive on any thread
//! that records an issue, which is why observers must be `Send + Sync`.

use crate::performance::PerformanceResult;
use crate::test_run::{CaseRun, SuiteRun};
use parking_lot::RwLock;
use rigor_proto::{Issue, Skip};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives test lifecycle events.
#[allow(unused_variables)]
pub trait TestObserver: Send + Sync {
    fn bundle_will_start(&self, bundle: &str) {}

    fn suite_will_start(&self, suite: &SuiteRun) {}

    fn case_will_start(&self, case: &CaseRun) {}

    fn case_did_fail(&self, case_name: &str, issue: &Issue) {}

    fn case_was_skipped(&self, case_name: &str, skip: &Skip) {}

    fn case_did_measure(&self, case_name: &str, result: &PerformanceResult) {}

    fn case_did_finish(&self, case: &CaseRun) {}

    fn suite_did_finish(&self, suite: &SuiteRun) {}

    fn bundle_did_finish(&self, bundle: &str) {}
}

/// Token returned by [`ObservationCenter::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Fan-out of lifecycle events to registered observers.
#[derive(Default)]
pub struct ObservationCenter {
    observers: RwLock<HashMap<ObserverId, Arc<dyn TestObserver>>>,
    next_id: AtomicU64,
}

impl ObservationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn TestObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().insert(id, observer);
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        self.observers.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Observers are called on a snapshot, so they may add or remove
    /// observers while handling an event.
    fn each(&self, event: impl Fn(&dyn TestObserver)) {
        let snapshot: Vec<Arc<dyn TestObserver>> = self.observers.read().values().cloned().collect();
        for observer in snapshot {
            event(observer.as_ref());
        }
    }

    pub fn bundle_will_start(&self, bundle: &str) {
        self.each(|o| o.bundle_will_start(bundle));
    }

    pub fn suite_will_start(&self, suite: &SuiteRun) {
        self.each(|o| o.suite_will_start(suite));
    }

    pub fn case_will_start(&self, case: &CaseRun) {
        self.each(|o| o.case_will_start(case));
    }

    pub fn case_did_fail(&self, case_name: &str, issue: &Issue) {
        self.each(|o| o.case_did_fail(case_name, issue));
    }

    pub fn case_was_skipped(&self, case_name: &str, skip: &Skip) {
        self.each(|o| o.case_was_skipped(case_name, skip));
    }

    pub fn case_did_measure(&self, case_name: &str, result: &PerformanceResult) {
        self.each(|o| o.case_did_measure(case_name, result));
    }

    pub fn case_did_finish(&self, case: &CaseRun) {
        self.each(|o| o.case_did_finish(case));
    }

    pub fn suite_did_finish(&self, suite: &SuiteRun) {
        self.each(|o| o.suite_did_finish(suite));
    }

    pub fn bundle_did_finish(&self, bundle: &str) {
        self.each(|o| o.bundle_did_finish(bundle));
    }
}

impl std::fmt::Debug for ObservationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationCenter")
            .field("observers", &self.len())
            .finish()
    }
}
