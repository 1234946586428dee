//! Shared run state behind a single lock.
//!
//! Everything a background thread can reach lives here:
//! - the per-run table of live test cases
//! - expectation fulfillment state
//! - the expected-failure stack
//! - each case's teardown queue
//!
//! All of it is mutated under one `parking_lot::Mutex`. Observer callbacks and
//! cleanup hooks always run after the lock is released.
//!
//! Test cases are referenced by [`CaseId`]. A handle whose case has been
//! unregistered finds nothing in the table and every operation through it
//! becomes a no-op, so late callbacks cannot touch a finished test.

use crate::expectation::{CleanupHook, Expectation, ExpectationId, FulfillOutcome};
use crate::expected_failure::{
    ContextId, ExpectedFailureContext, ExpectedFailureOptions, ExpectedFailureStack,
};
use crate::observation::ObservationCenter;
use crate::run_loop::MainQueue;
use crate::teardown::{TeardownBlock, TeardownBlocks, TeardownError};
use crate::test_run::CaseRun;
use parking_lot::Mutex;
use rigor_proto::{Issue, SourceLocation, Skip, TestResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_CASE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_FULFILLMENT: AtomicU64 = AtomicU64::new(1);

/// Identity of one test case run in the subsystem table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseId(u64);

impl CaseId {
    fn next() -> Self {
        Self(NEXT_CASE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn for_tests(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Default)]
struct ExpectationEntry {
    sequence: Option<u64>,
    cleanups: Vec<CleanupHook>,
    cleaned: bool,
}

struct CaseRecord {
    name: String,
    primary_thread: ThreadId,
    run: CaseRun,
    /// Every expectation the case created, waited for or not.
    created: Vec<Expectation>,
    /// Expectations not yet covered by a wait.
    live: Vec<Expectation>,
    waiting: bool,
    stopped: bool,
    continue_after_failure: bool,
    teardown: TeardownBlocks,
}

#[derive(Default)]
struct SubsystemState {
    cases: HashMap<CaseId, CaseRecord>,
    expectations: HashMap<ExpectationId, ExpectationEntry>,
    expected_failures: ExpectedFailureStack,
}

/// What happened to an issue handed to [`Subsystem::record_issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordOutcome {
    Recorded,
    Suppressed(ContextId),
    CaseFinished,
}

pub(crate) struct Subsystem {
    state: Mutex<SubsystemState>,
    observers: Arc<ObservationCenter>,
    main_queue: MainQueue,
}

impl Subsystem {
    pub(crate) fn new(observers: Arc<ObservationCenter>, main_queue: MainQueue) -> Self {
        Self {
            state: Mutex::new(SubsystemState::default()),
            observers,
            main_queue,
        }
    }

    /// A private subsystem for expectations that belong to no run.
    pub(crate) fn detached() -> Arc<Self> {
        Arc::new(Self::new(
            Arc::new(ObservationCenter::new()),
            MainQueue::default(),
        ))
    }

    // ---- cases -------------------------------------------------------------

    /// Adds a live case owned by the current thread and starts its run.
    pub(crate) fn register_case(&self, name: &str, continue_after_failure: bool) -> CaseId {
        let id = CaseId::next();
        let mut run = CaseRun::new(name);
        run.start();

        self.state.lock().cases.insert(
            id,
            CaseRecord {
                name: name.to_string(),
                primary_thread: thread::current().id(),
                run,
                created: Vec::new(),
                live: Vec::new(),
                waiting: false,
                stopped: false,
                continue_after_failure,
                teardown: TeardownBlocks::new(),
            },
        );
        id
    }

    /// Removes the case, forgets its expectations and returns its stopped run.
    pub(crate) fn unregister_case(&self, case: CaseId) -> Option<CaseRun> {
        let (record, hooks) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let record = state.cases.remove(&case)?;
            let mut hooks = Vec::new();
            for expectation in &record.created {
                if let Some(entry) = state.expectations.remove(&expectation.id()) {
                    hooks.extend(entry.cleanups);
                }
            }
            (record, hooks)
        };

        for hook in hooks {
            hook();
        }

        let CaseRecord { mut run, .. } = record;
        run.stop();
        Some(run)
    }

    pub(crate) fn is_live(&self, case: CaseId) -> bool {
        self.state.lock().cases.contains_key(&case)
    }

    pub(crate) fn run_snapshot(&self, case: CaseId) -> Option<CaseRun> {
        self.state.lock().cases.get(&case).map(|r| r.run.clone())
    }

    pub(crate) fn is_stopped(&self, case: CaseId) -> bool {
        self.state.lock().cases.get(&case).is_some_and(|r| r.stopped)
    }

    pub(crate) fn continue_after_failure(&self, case: CaseId) -> bool {
        self.state
            .lock()
            .cases
            .get(&case)
            .is_none_or(|r| r.continue_after_failure)
    }

    pub(crate) fn set_continue_after_failure(&self, case: CaseId, value: bool) {
        if let Some(record) = self.state.lock().cases.get_mut(&case) {
            record.continue_after_failure = value;
        }
    }

    pub(crate) fn total_failure_count(&self, case: CaseId) -> usize {
        self.state
            .lock()
            .cases
            .get(&case)
            .map_or(0, |r| r.run.total_failure_count())
    }

    // ---- failure funnel ----------------------------------------------------

    /// Records `issue` against `case`.
    ///
    /// The expected-failure stack is consulted first; a matched issue is kept
    /// as suppressed and observers are not told about it.
    pub(crate) fn record_issue(&self, case: CaseId, issue: Issue) -> RecordOutcome {
        self.record(case, issue, true)
    }

    fn record(&self, case: CaseId, issue: Issue, matchable: bool) -> RecordOutcome {
        let thread = thread::current().id();
        let name = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(record) = state.cases.get_mut(&case) else {
                tracing::debug!(
                    issue = %issue,
                    "dropping issue recorded after its test case finished"
                );
                return RecordOutcome::CaseFinished;
            };

            let matched = if matchable {
                state.expected_failures.match_issue(&issue, thread)
            } else {
                None
            };
            if let Some(context) = matched {
                tracing::debug!(test = %record.name, issue = %issue, "issue matched expected failure");
                record.run.record_suppressed(issue);
                return RecordOutcome::Suppressed(context);
            }

            record.run.record_issue(issue.clone());
            if !record.continue_after_failure {
                record.stopped = true;
            }
            record.name.clone()
        };

        self.observers.case_did_fail(&name, &issue);
        RecordOutcome::Recorded
    }

    pub(crate) fn record_skip(&self, case: CaseId, skip: Skip) {
        if let Some(record) = self.state.lock().cases.get_mut(&case) {
            record.run.record_skip(skip);
        }
    }

    // ---- expectations ------------------------------------------------------

    pub(crate) fn register_expectation(&self, expectation: &Expectation) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(owner) = expectation.owner() {
            let Some(record) = state.cases.get_mut(&owner) else {
                tracing::debug!(
                    expectation = %expectation,
                    "expectation created for a finished test case"
                );
                return;
            };
            record.created.push(expectation.clone());
            record.live.push(expectation.clone());
        }
        state
            .expectations
            .insert(expectation.id(), ExpectationEntry::default());
    }

    pub(crate) fn fulfillment_sequence(&self, id: ExpectationId) -> Option<u64> {
        self.state
            .lock()
            .expectations
            .get(&id)
            .and_then(|entry| entry.sequence)
    }

    pub(crate) fn mark_fulfilled(&self, id: ExpectationId) -> FulfillOutcome {
        let outcome = match self.state.lock().expectations.get_mut(&id) {
            None => FulfillOutcome::Orphaned,
            Some(entry) if entry.sequence.is_some() => FulfillOutcome::AlreadyFulfilled,
            Some(entry) => {
                entry.sequence = Some(NEXT_FULFILLMENT.fetch_add(1, Ordering::Relaxed));
                FulfillOutcome::Fulfilled
            }
        };

        if outcome == FulfillOutcome::Fulfilled {
            self.main_queue.wake();
        }
        outcome
    }

    pub(crate) fn add_expectation_cleanup(&self, id: ExpectationId, hook: CleanupHook) {
        let run_now = match self.state.lock().expectations.get_mut(&id) {
            Some(entry) if !entry.cleaned => {
                entry.cleanups.push(hook);
                None
            }
            _ => Some(hook),
        };
        if let Some(hook) = run_now {
            hook();
        }
    }

    pub(crate) fn clean_up_expectation(&self, id: ExpectationId) {
        let hooks = match self.state.lock().expectations.get_mut(&id) {
            Some(entry) => {
                entry.cleaned = true;
                std::mem::take(&mut entry.cleanups)
            }
            None => Vec::new(),
        };
        for hook in hooks {
            hook();
        }
    }

    /// Expectations of `case` not yet covered by a wait, in creation order.
    pub(crate) fn live_expectations(&self, case: CaseId) -> Vec<Expectation> {
        self.state
            .lock()
            .cases
            .get(&case)
            .map(|r| r.live.clone())
            .unwrap_or_default()
    }

    /// Empties the live list of `case` and returns what was in it.
    pub(crate) fn take_live_expectations(&self, case: CaseId) -> Vec<Expectation> {
        self.state
            .lock()
            .cases
            .get_mut(&case)
            .map(|r| std::mem::take(&mut r.live))
            .unwrap_or_default()
    }

    /// Marks `case` as waiting. Returns false if a wait is already active.
    pub(crate) fn begin_wait(&self, case: CaseId) -> bool {
        match self.state.lock().cases.get_mut(&case) {
            Some(record) if record.waiting => false,
            Some(record) => {
                record.waiting = true;
                true
            }
            None => true,
        }
    }

    /// Ends the active wait and drops `waited` from the live list.
    pub(crate) fn end_wait(&self, case: CaseId, waited: &[Expectation]) {
        if let Some(record) = self.state.lock().cases.get_mut(&case) {
            record.waiting = false;
            record.live.retain(|e| !waited.contains(e));
        }
    }

    // ---- teardown ----------------------------------------------------------

    pub(crate) fn add_teardown_block(
        &self,
        case: CaseId,
        block: TeardownBlock,
    ) -> Result<(), TeardownError> {
        match self.state.lock().cases.get_mut(&case) {
            Some(record) => record.teardown.append(block),
            None => Err(TeardownError::AlreadyFinalized),
        }
    }

    pub(crate) fn finalize_teardown(
        &self,
        case: CaseId,
    ) -> Result<Vec<TeardownBlock>, TeardownError> {
        match self.state.lock().cases.get_mut(&case) {
            Some(record) => record.teardown.finalize(),
            None => Err(TeardownError::FinalizedTwice),
        }
    }

    // ---- expected failures -------------------------------------------------

    pub(crate) fn push_expected_failure(
        &self,
        case: CaseId,
        reason: Option<String>,
        options: ExpectedFailureOptions,
        location: SourceLocation,
    ) -> ContextId {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let on_primary = state
            .cases
            .get(&case)
            .is_some_and(|r| r.primary_thread == thread::current().id());
        let context = ExpectedFailureContext::new(reason, options, Some(case), location);
        state.expected_failures.push(context, on_primary)
    }

    pub(crate) fn pop_expected_failure(&self, case: CaseId, id: ContextId) {
        let context = self.state.lock().expected_failures.pop(id);
        if let Some(context) = context {
            self.report_unmatched(case, &context);
        }
    }

    /// Pops every context still owned by `case`, newest first.
    pub(crate) fn pop_case_expected_failures(&self, case: CaseId) {
        let contexts = self.state.lock().expected_failures.drain_case(case);
        for context in &contexts {
            self.report_unmatched(case, context);
        }
    }

    /// Unmatched-context issues bypass the stack so an enclosing context
    /// cannot absorb them.
    fn report_unmatched(&self, case: CaseId, context: &ExpectedFailureContext) {
        if context.is_unmatched_strict() {
            self.record(case, context.unmatched_issue(), false);
        }
    }
}

/// Cloneable, sendable handle to one test case's slot in the subsystem.
///
/// It never keeps the case alive: once the case has finished, recording
/// through the handle is silently ignored.
#[derive(Clone)]
pub struct CaseHandle {
    case: CaseId,
    subsystem: Arc<Subsystem>,
}

impl CaseHandle {
    pub(crate) fn new(case: CaseId, subsystem: Arc<Subsystem>) -> Self {
        Self { case, subsystem }
    }

    pub fn id(&self) -> CaseId {
        self.case
    }

    /// Returns true while the test case is running.
    pub fn is_live(&self) -> bool {
        self.subsystem.is_live(self.case)
    }

    /// Returns true once a failure was recorded with continue-after-failure off.
    pub fn is_stopped(&self) -> bool {
        self.subsystem.is_stopped(self.case)
    }

    /// Records `issue` against the case. Returns true if it counts as a failure.
    pub fn record_issue(&self, issue: Issue) -> bool {
        self.subsystem.record_issue(self.case, issue) == RecordOutcome::Recorded
    }

    /// Records an assertion-style failure located at the caller.
    #[track_caller]
    pub fn record_failure(&self, description: impl Into<String>) -> bool {
        self.record_issue(Issue::assertion_failure(description).with_location(SourceLocation::caller()))
    }

    /// Registers a block to run after the test body, newest first.
    ///
    /// # Panics
    ///
    /// Panics if the case's teardown blocks have already been dequeued.
    /// Registering that late is a bug in the test itself.
    pub fn add_teardown_block(&self, block: impl FnOnce() -> TestResult + Send + 'static) {
        if let Err(err) = self.subsystem.add_teardown_block(self.case, Box::new(block)) {
            panic!("{err}");
        }
    }

    pub(crate) fn subsystem(&self) -> &Arc<Subsystem> {
        &self.subsystem
    }
}

impl std::fmt::Debug for CaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseHandle")
            .field("case", &self.case)
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subsystem() -> Arc<Subsystem> {
        Arc::new(Subsystem::new(
            Arc::new(ObservationCenter::new()),
            MainQueue::default(),
        ))
    }

    fn expectation(subsystem: &Arc<Subsystem>, case: CaseId, description: &str) -> Expectation {
        Expectation::create(
            subsystem,
            Some(case),
            description.to_string(),
            SourceLocation::caller(),
            false,
        )
    }

    #[test]
    fn test_double_fulfill_records_one_violation_per_extra_call() {
        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);
        let exp = expectation(&subsystem, case, "foo");

        exp.fulfill();
        exp.fulfill();
        exp.fulfill();

        let run = subsystem.unregister_case(case).unwrap();
        assert_eq!(run.unexpected_exception_count(), 2);
        assert_eq!(
            run.issues()[0].compact_description,
            "API violation - multiple calls made to fulfill() for foo."
        );
    }

    #[test]
    fn test_fulfill_after_case_finished_is_a_no_op() {
        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);
        let exp = expectation(&subsystem, case, "late");
        subsystem.unregister_case(case);

        exp.fulfill();
        exp.fulfill();
        assert!(!exp.is_fulfilled());
        assert!(!subsystem.is_live(case));
    }

    #[test]
    fn test_live_list_tracks_waits() {
        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);
        let a = expectation(&subsystem, case, "a");
        let b = expectation(&subsystem, case, "b");

        assert!(subsystem.begin_wait(case));
        assert!(!subsystem.begin_wait(case));
        subsystem.end_wait(case, std::slice::from_ref(&a));

        assert_eq!(subsystem.live_expectations(case), vec![b.clone()]);
        assert_eq!(subsystem.take_live_expectations(case), vec![b]);
        assert!(subsystem.live_expectations(case).is_empty());
    }

    #[test]
    fn test_stop_flag_follows_continue_after_failure() {
        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);
        subsystem.record_issue(case, Issue::assertion_failure("one"));
        assert!(!subsystem.is_stopped(case));

        subsystem.set_continue_after_failure(case, false);
        subsystem.record_issue(case, Issue::assertion_failure("two"));
        assert!(subsystem.is_stopped(case));
        assert_eq!(subsystem.total_failure_count(case), 2);
    }

    #[test]
    fn test_expected_failure_suppresses_then_reports_unmatched() {
        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);

        let id = subsystem.push_expected_failure(
            case,
            Some("known".into()),
            ExpectedFailureOptions::default(),
            SourceLocation::caller(),
        );
        let outcome = subsystem.record_issue(case, Issue::assertion_failure("boom"));
        assert_eq!(outcome, RecordOutcome::Suppressed(id));
        subsystem.pop_expected_failure(case, id);

        subsystem.push_expected_failure(
            case,
            Some("never happens".into()),
            ExpectedFailureOptions::default(),
            SourceLocation::caller(),
        );
        subsystem.pop_case_expected_failures(case);

        let run = subsystem.unregister_case(case).unwrap();
        assert_eq!(run.suppressed_issues().len(), 1);
        assert_eq!(run.failure_count(), 1);
        assert_eq!(
            run.issues()[0].compact_description,
            "Expected failure was not matched: never happens"
        );
    }

    #[test]
    fn test_unregister_runs_cleanup_hooks() {
        use std::sync::atomic::AtomicBool;

        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);
        let exp = expectation(&subsystem, case, "observed");
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        exp.on_cleanup(move || flag.store(true, Ordering::SeqCst));

        subsystem.unregister_case(case);
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[test]
    #[should_panic(expected = "attempting to add a teardown block after teardown blocks have been dequeued")]
    fn test_late_teardown_registration_panics() {
        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);
        let handle = CaseHandle::new(case, Arc::clone(&subsystem));
        subsystem.finalize_teardown(case).unwrap();

        handle.add_teardown_block(|| Ok(()));
    }

    #[test]
    fn test_handle_records_nothing_after_finish() {
        let subsystem = subsystem();
        let case = subsystem.register_case("A.test", true);
        let handle = CaseHandle::new(case, Arc::clone(&subsystem));
        assert!(handle.record_failure("counted"));

        subsystem.unregister_case(case);
        assert!(!handle.is_live());
        assert!(!handle.record_failure("ignored"));
    }
}
