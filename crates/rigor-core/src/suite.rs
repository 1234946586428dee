//! Composite test suites.

use crate::env::RunEnvironment;
use crate::test_case::TestCase;
use crate::test_run::{SuiteRun, TestRun};

/// A node of the test tree.
#[derive(Debug, Clone)]
pub enum Test {
    Case(TestCase),
    Suite(TestSuite),
}

impl Test {
    pub fn name(&self) -> String {
        match self {
            Test::Case(case) => case.name(),
            Test::Suite(suite) => suite.name().to_string(),
        }
    }

    pub fn test_case_count(&self) -> usize {
        match self {
            Test::Case(_) => 1,
            Test::Suite(suite) => suite.test_case_count(),
        }
    }

    pub fn run(&self, env: &RunEnvironment) -> TestRun {
        match self {
            Test::Case(case) => case.run(env),
            Test::Suite(suite) => suite.run(env),
        }
    }
}

impl From<TestCase> for Test {
    fn from(case: TestCase) -> Self {
        Test::Case(case)
    }
}

impl From<TestSuite> for Test {
    fn from(suite: TestSuite) -> Self {
        Test::Suite(suite)
    }
}

/// An ordered group of tests, optionally with class-level hooks.
#[derive(Debug, Clone)]
pub struct TestSuite {
    name: String,
    tests: Vec<Test>,
    set_up: Option<fn()>,
    tear_down: Option<fn()>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
            set_up: None,
            tear_down: None,
        }
    }

    /// Hooks run once around all tests of the suite.
    pub fn with_class_hooks(mut self, set_up: Option<fn()>, tear_down: Option<fn()>) -> Self {
        self.set_up = set_up;
        self.tear_down = tear_down;
        self
    }

    pub fn add(&mut self, test: impl Into<Test>) {
        self.tests.push(test.into());
    }

    pub fn with(mut self, test: impl Into<Test>) -> Self {
        self.add(test);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn test_case_count(&self) -> usize {
        self.tests.iter().map(Test::test_case_count).sum()
    }

    /// Runs every child in order between the class hooks.
    pub fn run(&self, env: &RunEnvironment) -> TestRun {
        let mut run = SuiteRun::new(&self.name);
        run.start();
        env.observers().suite_will_start(&run);
        tracing::debug!(suite = %self.name, tests = self.tests.len(), "suite started");

        if let Some(set_up) = self.set_up {
            set_up();
        }
        for test in &self.tests {
            run.add_run(test.run(env));
        }
        if let Some(tear_down) = self.tear_down {
            tear_down();
        }

        run.stop();
        env.observers().suite_did_finish(&run);
        TestRun::Suite(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::TestObserver;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SET_UPS: AtomicUsize = AtomicUsize::new(0);
    static TEAR_DOWNS: AtomicUsize = AtomicUsize::new(0);

    fn count_set_up() {
        SET_UPS.fetch_add(1, Ordering::SeqCst);
    }

    fn count_tear_down() {
        TEAR_DOWNS.fetch_add(1, Ordering::SeqCst);
    }

    #[derive(Default)]
    struct SuiteEvents(Mutex<Vec<String>>);

    impl TestObserver for SuiteEvents {
        fn suite_will_start(&self, suite: &SuiteRun) {
            self.0.lock().push(format!("start {}", suite.name()));
        }

        fn suite_did_finish(&self, suite: &SuiteRun) {
            self.0.lock().push(format!(
                "finish {} {}/{}",
                suite.name(),
                suite.execution_count(),
                suite.total_failure_count()
            ));
        }
    }

    #[test]
    fn test_nested_suites_aggregate() {
        let env = RunEnvironment::default();
        let events = Arc::new(SuiteEvents::default());
        env.add_observer(events.clone());

        let class = TestSuite::new("Tests.A")
            .with_class_hooks(Some(count_set_up), Some(count_tear_down))
            .with(TestCase::new("A", "test_pass", |_| Ok(())))
            .with(TestCase::new("A", "test_fail", |ctx| ctx.fail("nope")));
        let root = TestSuite::new("All tests").with(class);

        assert_eq!(root.test_case_count(), 2);
        let run = root.run(&env);

        assert_eq!(run.execution_count(), 2);
        assert_eq!(run.total_failure_count(), 1);
        assert_eq!(SET_UPS.load(Ordering::SeqCst), 1);
        assert_eq!(TEAR_DOWNS.load(Ordering::SeqCst), 1);
        assert_eq!(
            *events.0.lock(),
            vec![
                "start All tests".to_string(),
                "start Tests.A".to_string(),
                "finish Tests.A 2/1".to_string(),
                "finish All tests 2/1".to_string(),
            ]
        );
    }
}
