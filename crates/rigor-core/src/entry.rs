//! The explicit registration table.
//!
//! Test classes are registered as [`TestCaseEntry`] values, one per class:
//!
//! ```
//! use rigor_core::{Fixture, TestCaseEntry, TestContext};
//! use rigor_proto::TestResult;
//!
//! #[derive(Default)]
//! struct ParserTests {
//!     input: String,
//! }
//!
//! impl Fixture for ParserTests {
//!     fn set_up(&mut self, _ctx: &mut TestContext<'_>) -> TestResult {
//!         self.input = "1 + 2".into();
//!         Ok(())
//!     }
//! }
//!
//! impl ParserTests {
//!     fn test_tokens(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
//!         ctx.assert_eq(self.input.split(' ').count(), 3, "")
//!     }
//! }
//!
//! let entries = vec![
//!     TestCaseEntry::new("ParserTests").fixture_test("test_tokens", ParserTests::test_tokens),
//!     TestCaseEntry::new("SmokeTests").test("test_trivial", |ctx| ctx.assert_true(true, "")),
//! ];
//! assert_eq!(entries[0].tests().len(), 1);
//! ```

use crate::context::TestContext;
use crate::suite::TestSuite;
use crate::test_case::{Fixture, TestCase, TestMethod};
use rigor_proto::TestResult;

/// One test class: its name, module and test methods.
#[derive(Debug, Clone)]
pub struct TestCaseEntry {
    class_name: String,
    module_name: Option<String>,
    tests: Vec<TestCase>,
    class_set_up: Option<fn()>,
    class_tear_down: Option<fn()>,
}

impl TestCaseEntry {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            module_name: None,
            tests: Vec::new(),
            class_set_up: None,
            class_tear_down: None,
        }
    }

    /// Sets the module of the class and of every test already added.
    pub fn module(mut self, module_name: impl Into<String>) -> Self {
        let module_name = module_name.into();
        self.tests = self
            .tests
            .into_iter()
            .map(|test| test.in_module(module_name.clone()))
            .collect();
        self.module_name = Some(module_name);
        self
    }

    /// Adds a closure-style test method.
    pub fn test(
        self,
        method_name: impl Into<String>,
        body: impl Fn(&mut TestContext<'_>) -> TestResult + 'static,
    ) -> Self {
        let case = TestCase::new(self.class_name.clone(), method_name, body);
        self.push(case)
    }

    /// Adds a method of fixture `F`, and `F`'s class-level hooks.
    pub fn fixture_test<F: Fixture>(
        mut self,
        method_name: impl Into<String>,
        method: TestMethod<F>,
    ) -> Self {
        self.class_set_up = Some(F::set_up_class);
        self.class_tear_down = Some(F::tear_down_class);
        let case = TestCase::from_fixture::<F>(self.class_name.clone(), method_name, method);
        self.push(case)
    }

    fn push(mut self, case: TestCase) -> Self {
        let case = match &self.module_name {
            Some(module) => case.in_module(module.clone()),
            None => case,
        };
        self.tests.push(case);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// The entry's module, or `default_module` when none was set.
    pub fn resolved_module<'a>(&'a self, default_module: &'a str) -> &'a str {
        self.module_name.as_deref().unwrap_or(default_module)
    }

    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    pub(crate) fn retain_tests(&mut self, keep: impl FnMut(&TestCase) -> bool) {
        self.tests.retain(keep);
    }

    /// The class suite, named `{Module}.{Class}`.
    pub fn to_suite(&self, default_module: &str) -> TestSuite {
        let name = format!("{}.{}", self.resolved_module(default_module), self.class_name);
        self.tests.iter().cloned().fold(
            TestSuite::new(name).with_class_hooks(self.class_set_up, self.class_tear_down),
            |suite, case| suite.with(case),
        )
    }
}
