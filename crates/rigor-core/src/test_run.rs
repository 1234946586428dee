//! Run records for cases and suites.
//!
//! A [`CaseRun`] accumulates what happened while one test case ran. A
//! [`SuiteRun`] only holds its children: every suite total is summed from the
//! child runs each time it is read, so there is no cached aggregate to go
//! stale.

use chrono::{DateTime, Local};
use rigor_proto::{Issue, Skip};
use std::time::{Duration, Instant};

/// Start/stop timestamps shared by case and suite runs.
#[derive(Debug, Clone, Default)]
pub struct RunTimes {
    start: Option<Instant>,
    stop: Option<Instant>,
    start_date: Option<DateTime<Local>>,
    stop_date: Option<DateTime<Local>>,
}

impl RunTimes {
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.start_date = Some(Local::now());
    }

    pub fn stop(&mut self) {
        self.stop = Some(Instant::now());
        self.stop_date = Some(Local::now());
    }

    /// Time between start and stop, or so far if still running.
    pub fn duration(&self) -> Duration {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn start_date(&self) -> Option<DateTime<Local>> {
        self.start_date
    }

    pub fn stop_date(&self) -> Option<DateTime<Local>> {
        self.stop_date
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_some()
    }
}

/// Outcome record of one test case run.
#[derive(Debug, Clone)]
pub struct CaseRun {
    name: String,
    times: RunTimes,
    failure_count: usize,
    unexpected_count: usize,
    issues: Vec<Issue>,
    suppressed: Vec<Issue>,
    skip: Option<Skip>,
}

impl CaseRun {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            times: RunTimes::default(),
            failure_count: 0,
            unexpected_count: 0,
            issues: Vec::new(),
            suppressed: Vec::new(),
            skip: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&mut self) {
        self.times.start();
    }

    pub fn stop(&mut self) {
        self.times.stop();
    }

    pub fn times(&self) -> &RunTimes {
        &self.times
    }

    /// Counts `issue` as a failure, expected or unexpected by its kind.
    pub fn record_issue(&mut self, issue: Issue) {
        if issue.is_expected() {
            self.failure_count += 1;
        } else {
            self.unexpected_count += 1;
        }
        self.issues.push(issue);
    }

    /// Keeps `issue` for reporting without counting it as a failure.
    pub fn record_suppressed(&mut self, issue: Issue) {
        self.suppressed.push(issue);
    }

    pub fn record_skip(&mut self, skip: Skip) {
        self.skip = Some(skip);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Issues absorbed by an expected-failure context.
    pub fn suppressed_issues(&self) -> &[Issue] {
        &self.suppressed
    }

    pub fn skip(&self) -> Option<&Skip> {
        self.skip.as_ref()
    }

    pub fn has_been_skipped(&self) -> bool {
        self.skip.is_some()
    }

    /// Assertion-style failures.
    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn unexpected_exception_count(&self) -> usize {
        self.unexpected_count
    }

    pub fn total_failure_count(&self) -> usize {
        self.failure_count + self.unexpected_count
    }

    pub fn has_succeeded(&self) -> bool {
        self.total_failure_count() == 0
    }

    pub fn duration(&self) -> Duration {
        self.times.duration()
    }
}

/// Outcome record of a suite: its child runs and its own timestamps.
#[derive(Debug, Clone)]
pub struct SuiteRun {
    name: String,
    times: RunTimes,
    runs: Vec<TestRun>,
}

impl SuiteRun {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            times: RunTimes::default(),
            runs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&mut self) {
        self.times.start();
    }

    pub fn stop(&mut self) {
        self.times.stop();
    }

    pub fn times(&self) -> &RunTimes {
        &self.times
    }

    pub fn add_run(&mut self, run: TestRun) {
        self.runs.push(run);
    }

    pub fn runs(&self) -> &[TestRun] {
        &self.runs
    }

    pub fn execution_count(&self) -> usize {
        self.runs.iter().map(TestRun::execution_count).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.runs.iter().map(TestRun::failure_count).sum()
    }

    pub fn unexpected_exception_count(&self) -> usize {
        self.runs.iter().map(TestRun::unexpected_exception_count).sum()
    }

    pub fn total_failure_count(&self) -> usize {
        self.runs.iter().map(TestRun::total_failure_count).sum()
    }

    pub fn skip_count(&self) -> usize {
        self.runs.iter().map(TestRun::skip_count).sum()
    }

    pub fn suppressed_count(&self) -> usize {
        self.runs.iter().map(TestRun::suppressed_count).sum()
    }

    /// Sum of the children's test durations.
    pub fn test_duration(&self) -> Duration {
        self.runs.iter().map(TestRun::test_duration).sum()
    }

    /// Wall time of the suite itself, including class set-up and tear-down.
    pub fn total_duration(&self) -> Duration {
        self.times.duration()
    }

    pub fn has_succeeded(&self) -> bool {
        self.total_failure_count() == 0
    }
}

/// Run record of any test: a case or a suite.
#[derive(Debug, Clone)]
pub enum TestRun {
    Case(CaseRun),
    Suite(SuiteRun),
}

impl TestRun {
    pub fn name(&self) -> &str {
        match self {
            TestRun::Case(run) => run.name(),
            TestRun::Suite(run) => run.name(),
        }
    }

    /// Number of test cases that ran, skipped ones included.
    pub fn execution_count(&self) -> usize {
        match self {
            TestRun::Case(run) => usize::from(run.times().is_stopped()),
            TestRun::Suite(run) => run.execution_count(),
        }
    }

    pub fn failure_count(&self) -> usize {
        match self {
            TestRun::Case(run) => run.failure_count(),
            TestRun::Suite(run) => run.failure_count(),
        }
    }

    pub fn unexpected_exception_count(&self) -> usize {
        match self {
            TestRun::Case(run) => run.unexpected_exception_count(),
            TestRun::Suite(run) => run.unexpected_exception_count(),
        }
    }

    pub fn total_failure_count(&self) -> usize {
        match self {
            TestRun::Case(run) => run.total_failure_count(),
            TestRun::Suite(run) => run.total_failure_count(),
        }
    }

    pub fn skip_count(&self) -> usize {
        match self {
            TestRun::Case(run) => usize::from(run.has_been_skipped()),
            TestRun::Suite(run) => run.skip_count(),
        }
    }

    pub fn suppressed_count(&self) -> usize {
        match self {
            TestRun::Case(run) => run.suppressed_issues().len(),
            TestRun::Suite(run) => run.suppressed_count(),
        }
    }

    pub fn test_duration(&self) -> Duration {
        match self {
            TestRun::Case(run) => run.duration(),
            TestRun::Suite(run) => run.test_duration(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            TestRun::Case(run) => run.duration(),
            TestRun::Suite(run) => run.total_duration(),
        }
    }

    pub fn has_succeeded(&self) -> bool {
        self.total_failure_count() == 0
    }

    pub fn as_case(&self) -> Option<&CaseRun> {
        match self {
            TestRun::Case(run) => Some(run),
            TestRun::Suite(_) => None,
        }
    }

    pub fn as_suite(&self) -> Option<&SuiteRun> {
        match self {
            TestRun::Case(_) => None,
            TestRun::Suite(run) => Some(run),
        }
    }

    /// Every case run below (or at) this run, depth first.
    pub fn case_runs(&self) -> Vec<&CaseRun> {
        match self {
            TestRun::Case(run) => vec![run],
            TestRun::Suite(run) => run.runs().iter().flat_map(TestRun::case_runs).collect(),
        }
    }
}
