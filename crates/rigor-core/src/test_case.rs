//! Test cases and their lifecycle.
//!
//! A [`TestCase`] pairs a name with a factory for a fresh test instance.
//! [`TestCase::run`] drives one run of it:
//!
//! ```text
//!   register ─▶ set_up ─▶ body ─▶ skip? ─▶ unwaited ─▶ teardown ─▶ expected ─▶ unregister
//!   (will_start)          │       (was_skipped)  check    blocks,    failures   (did_finish)
//!                         └─ skipped when set_up fails    tear_down  popped
//!                            or the case was stopped
//! ```
//!
//! Fixture-style tests implement [`Fixture`] and register methods of the
//! fixture type; closure-style tests use [`TestCase::new`].

use crate::context::{CasePhase, TestContext};
use crate::env::RunEnvironment;
use crate::subsystem::CaseHandle;
use crate::test_run::{CaseRun, TestRun};
use rigor_proto::{Issue, Skip, TestError, TestResult};
use std::fmt;
use std::sync::Arc;

/// Per-test state built fresh for every test method run.
#[allow(unused_variables)]
pub trait Fixture: Default + 'static {
    fn set_up(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        Ok(())
    }

    fn tear_down(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        Ok(())
    }

    /// Runs once before the first test of the class.
    fn set_up_class() {}

    /// Runs once after the last test of the class.
    fn tear_down_class() {}
}

/// A test method of fixture `F`.
pub type TestMethod<F> = fn(&mut F, &mut TestContext<'_>) -> TestResult;

/// A closure-style test body.
pub type TestBody = Arc<dyn Fn(&mut TestContext<'_>) -> TestResult>;

trait TestInstance {
    fn set_up(&mut self, ctx: &mut TestContext<'_>) -> TestResult;
    fn invoke(&mut self, ctx: &mut TestContext<'_>) -> TestResult;
    fn tear_down(&mut self, ctx: &mut TestContext<'_>) -> TestResult;
}

struct FixtureInstance<F: Fixture> {
    fixture: F,
    method: TestMethod<F>,
}

impl<F: Fixture> TestInstance for FixtureInstance<F> {
    fn set_up(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        self.fixture.set_up(ctx)
    }

    fn invoke(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        (self.method)(&mut self.fixture, ctx)
    }

    fn tear_down(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        self.fixture.tear_down(ctx)
    }
}

struct ClosureInstance {
    body: TestBody,
}

impl TestInstance for ClosureInstance {
    fn set_up(&mut self, _ctx: &mut TestContext<'_>) -> TestResult {
        Ok(())
    }

    fn invoke(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        (self.body)(ctx)
    }

    fn tear_down(&mut self, _ctx: &mut TestContext<'_>) -> TestResult {
        Ok(())
    }
}

type InstanceFactory = Arc<dyn Fn() -> Box<dyn TestInstance>>;

/// One runnable test method.
#[derive(Clone)]
pub struct TestCase {
    class_name: String,
    method_name: String,
    module_name: Option<String>,
    factory: InstanceFactory,
}

impl TestCase {
    /// A closure-style test.
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        body: impl Fn(&mut TestContext<'_>) -> TestResult + 'static,
    ) -> Self {
        let body: TestBody = Arc::new(body);
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            module_name: None,
            factory: Arc::new(move || -> Box<dyn TestInstance> {
                Box::new(ClosureInstance {
                    body: Arc::clone(&body),
                })
            }),
        }
    }

    /// A test running `method` on a fresh `F::default()`.
    pub fn from_fixture<F: Fixture>(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        method: TestMethod<F>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            module_name: None,
            factory: Arc::new(move || -> Box<dyn TestInstance> {
                Box::new(FixtureInstance {
                    fixture: F::default(),
                    method,
                })
            }),
        }
    }

    pub fn in_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }

    /// `Class.method`
    pub fn name(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// Runs the test once and returns its run record.
    pub fn run(&self, env: &RunEnvironment) -> TestRun {
        let name = self.name();
        let subsystem = env.subsystem();
        let case = subsystem.register_case(&name, env.config().continue_after_failure);
        if let Some(run) = subsystem.run_snapshot(case) {
            env.observers().case_will_start(&run);
        }
        tracing::debug!(test = %name, "test case started");

        let mut ctx = TestContext::new(env, CaseHandle::new(case, Arc::clone(subsystem)), name.clone());
        let mut instance = (self.factory)();
        let mut skip = None;

        ctx.set_phase(CasePhase::SetUp);
        let set_up = instance.set_up(&mut ctx);
        let set_up_ok = set_up.is_ok();
        absorb(&mut ctx, set_up, &mut skip);

        if set_up_ok && !ctx.is_stopped() {
            ctx.set_phase(CasePhase::Running);
            let outcome = instance.invoke(&mut ctx);
            absorb(&mut ctx, outcome, &mut skip);
        }

        if let Some(skip) = skip {
            tracing::debug!(test = %name, summary = %skip.summary(), "test case skipped");
            subsystem.record_skip(case, skip.clone());
            env.observers().case_was_skipped(&name, &skip);
        }

        for expectation in subsystem.take_live_expectations(case) {
            ctx.handle().record_issue(
                Issue::api_violation(format!(
                    "Failed due to unwaited expectation '{}'.",
                    expectation.description()
                ))
                .with_location(expectation.location().clone()),
            );
        }

        ctx.set_phase(CasePhase::TearDown);
        match subsystem.finalize_teardown(case) {
            Ok(blocks) => {
                for block in blocks {
                    absorb_teardown(&mut ctx, block());
                }
            }
            Err(err) => tracing::warn!(test = %name, %err, "teardown blocks unavailable"),
        }
        let tear_down = instance.tear_down(&mut ctx);
        absorb_teardown(&mut ctx, tear_down);

        subsystem.pop_case_expected_failures(case);
        ctx.set_phase(CasePhase::Finished);
        drop(ctx);

        let run = subsystem.unregister_case(case).unwrap_or_else(|| {
            let mut run = CaseRun::new(&name);
            run.start();
            run.stop();
            run
        });
        tracing::debug!(
            test = %name,
            succeeded = run.has_succeeded(),
            skipped = run.has_been_skipped(),
            "test case finished"
        );
        env.observers().case_did_finish(&run);
        TestRun::Case(run)
    }
}

/// Maps the outcome of set-up or the body onto the case.
fn absorb(ctx: &mut TestContext<'_>, outcome: TestResult, skip: &mut Option<Skip>) {
    match outcome {
        Ok(()) | Err(TestError::Stopped) => {}
        Err(TestError::Skip(requested)) => *skip = Some(requested),
        Err(TestError::Thrown(error)) => {
            ctx.handle().record_issue(Issue::thrown_error(&error));
        }
    }
}

/// Teardown cannot be skipped; a skip request there is ignored.
fn absorb_teardown(ctx: &mut TestContext<'_>, outcome: TestResult) {
    match outcome {
        Ok(()) | Err(TestError::Stopped) => {}
        Err(TestError::Skip(_)) => {
            tracing::debug!(test = %ctx.name(), "ignoring skip requested during teardown");
        }
        Err(TestError::Thrown(error)) => {
            ctx.handle().record_issue(Issue::thrown_error(&error));
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("class_name", &self.class_name)
            .field("method_name", &self.method_name)
            .field("module_name", &self.module_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::TestObserver;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl TestObserver for Events {
        fn case_will_start(&self, case: &CaseRun) {
            self.0.lock().push(format!("start {}", case.name()));
        }

        fn case_did_fail(&self, _case_name: &str, issue: &Issue) {
            self.0.lock().push(format!("fail {}", issue.compact_description));
        }

        fn case_was_skipped(&self, _case_name: &str, skip: &Skip) {
            self.0.lock().push(format!("skip {}", skip.summary()));
        }

        fn case_did_finish(&self, case: &CaseRun) {
            self.0.lock().push(format!("finish {}", case.name()));
        }
    }

    fn env_with_events() -> (RunEnvironment, Arc<Events>) {
        let env = RunEnvironment::default();
        let events = Arc::new(Events::default());
        env.add_observer(events.clone());
        (env, events)
    }

    #[test]
    fn test_passing_case_emits_start_and_finish() {
        let (env, events) = env_with_events();
        let run = TestCase::new("A", "test_ok", |_| Ok(())).run(&env);

        assert!(run.has_succeeded());
        assert_eq!(run.execution_count(), 1);
        assert_eq!(
            *events.0.lock(),
            vec!["start A.test_ok".to_string(), "finish A.test_ok".to_string()]
        );
    }

    #[test]
    fn test_thrown_error_is_unexpected_failure() {
        let (env, events) = env_with_events();
        let run = TestCase::new("A", "test_io", |_| {
            std::fs::read("/definitely/not/here")?;
            Ok(())
        })
        .run(&env);

        assert_eq!(run.unexpected_exception_count(), 1);
        assert!(events.0.lock()[1].starts_with("fail threw error"));
    }

    #[test]
    fn test_skip_still_runs_teardown() {
        let (env, events) = env_with_events();
        let torn_down = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&torn_down);

        let run = TestCase::new("A", "test_skip", move |ctx| {
            let flag = Arc::clone(&flag);
            ctx.add_teardown_block(move || {
                *flag.lock() = true;
                Ok(())
            });
            ctx.skip_unless(false, "needs network")?;
            unreachable!("body continues after skip")
        })
        .run(&env);

        assert!(*torn_down.lock());
        assert_eq!(run.skip_count(), 1);
        assert!(run.has_succeeded());
        assert!(
            events
                .0
                .lock()
                .contains(&"skip Test skipped: required true value but got false - needs network".to_string())
        );
    }

    #[test]
    fn test_unwaited_expectation_is_reported_at_creation_site() {
        let env = RunEnvironment::default();
        let run = TestCase::new("A", "test_forgot", |ctx| {
            ctx.expectation("never awaited");
            Ok(())
        })
        .run(&env);

        let case = run.as_case().unwrap();
        assert_eq!(case.unexpected_exception_count(), 1);
        let issue = &case.issues()[0];
        assert_eq!(
            issue.compact_description,
            "Failed due to unwaited expectation 'never awaited'."
        );
        assert!(issue.location.as_ref().unwrap().file.ends_with("test_case.rs"));
    }

    #[derive(Default)]
    struct Counter {
        value: u32,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Fixture for Counter {
        fn set_up(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
            self.value = 1;
            self.log.lock().push(format!("set_up {}", ctx.name()));
            Ok(())
        }

        fn tear_down(&mut self, _ctx: &mut TestContext<'_>) -> TestResult {
            self.log.lock().push(format!("tear_down {}", self.value));
            Ok(())
        }
    }

    impl Counter {
        fn test_increment(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
            self.value += 1;
            ctx.assert_eq(self.value, 2, "")
        }
    }

    #[test]
    fn test_fixture_gets_fresh_instance_each_run() {
        let env = RunEnvironment::default();
        let case = TestCase::from_fixture::<Counter>("Counter", "test_increment", Counter::test_increment);

        assert!(case.run(&env).has_succeeded());
        assert!(case.run(&env).has_succeeded());
    }

    #[test]
    fn test_stop_after_first_failure() {
        let env = RunEnvironment::default();
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);

        let run = TestCase::new("A", "test_stop", move |ctx| {
            ctx.set_continue_after_failure(false);
            ctx.fail("first")?;
            *flag.lock() = true;
            ctx.fail("second")
        })
        .run(&env);

        assert!(!*reached.lock());
        assert_eq!(run.failure_count(), 1);
    }

    #[test]
    fn test_teardown_block_error_is_recorded() {
        let env = RunEnvironment::default();
        let run = TestCase::new("A", "test_cleanup", |ctx| {
            ctx.add_teardown_block(|| Err(TestError::thrown(anyhow::anyhow!("cleanup failed"))));
            Ok(())
        })
        .run(&env);

        let case = run.as_case().unwrap();
        assert_eq!(case.issues()[0].compact_description, "threw error \"cleanup failed\"");
    }

    #[test]
    fn test_late_fulfil_after_finish_is_ignored() {
        let env = RunEnvironment::default();
        let escaped = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&escaped);

        let run = TestCase::new("A", "test_escape", move |ctx| {
            let exp = ctx.expectation("escapes");
            exp.fulfill();
            ctx.wait(std::slice::from_ref(&exp), Duration::from_millis(10));
            *slot.lock() = Some(exp);
            Ok(())
        })
        .run(&env);
        assert!(run.has_succeeded());

        let exp = escaped.lock().take().unwrap();
        exp.fulfill();
        assert!(!exp.is_fulfilled());
    }
}
