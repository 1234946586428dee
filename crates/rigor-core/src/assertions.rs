//! Assertion family on [`TestContext`].
//!
//! Every assertion records an `AssertionFailure` located at its caller and
//! returns `Ok(())`, unless the test has been stopped by a failure with
//! continue-after-failure turned off, in which case it returns
//! [`TestError::Stopped`](rigor_proto::TestError::Stopped). Bodies chain them
//! with `?`:
//!
//! ```
//! use rigor_core::{RunEnvironment, TestCase};
//!
//! let case = TestCase::new("MathTests", "test_add", |ctx| {
//!     ctx.assert_eq(2 + 2, 4, "")?;
//!     ctx.assert_true(1 < 2, "ordering")?;
//!     let parsed = ctx.unwrap("42".parse::<u32>().ok(), "")?;
//!     ctx.assert_eq_with_accuracy(f64::from(parsed) / 10.0, 4.2, 1e-9, "")
//! });
//! assert!(case.run(&RunEnvironment::default()).has_succeeded());
//! ```

use crate::context::TestContext;
use rigor_proto::{Issue, SourceLocation, TestError, TestResult};
use std::fmt::{Debug, Display};

fn describe(assertion: &str, details: &str, message: &str) -> String {
    let mut description = format!("{assertion} failed");
    if !details.is_empty() {
        description.push_str(": ");
        description.push_str(details);
    }
    if !message.is_empty() {
        description.push_str(" - ");
        description.push_str(message);
    }
    description
}

impl TestContext<'_> {
    fn check(
        &mut self,
        passed: bool,
        assertion: &str,
        details: impl FnOnce() -> String,
        message: &str,
        location: SourceLocation,
    ) -> TestResult {
        self.ensure_not_stopped()?;
        if passed {
            return Ok(());
        }
        let description = describe(assertion, &details(), message);
        self.record_issue(Issue::assertion_failure(description).with_location(location))
    }

    #[track_caller]
    pub fn assert_true(&mut self, condition: bool, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(condition, "assert_true", || "(\"false\") is not true".into(), message, location)
    }

    #[track_caller]
    pub fn assert_false(&mut self, condition: bool, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(!condition, "assert_false", || "(\"true\") is not false".into(), message, location)
    }

    #[track_caller]
    pub fn assert_eq<T: PartialEq + Debug>(&mut self, left: T, right: T, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            left == right,
            "assert_eq",
            || format!("(\"{left:?}\") is not equal to (\"{right:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_ne<T: PartialEq + Debug>(&mut self, left: T, right: T, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            left != right,
            "assert_ne",
            || format!("(\"{left:?}\") is equal to (\"{right:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_eq_with_accuracy(
        &mut self,
        left: f64,
        right: f64,
        accuracy: f64,
        message: &str,
    ) -> TestResult {
        let location = SourceLocation::caller();
        // NaN never compares equal, whatever the accuracy.
        let passed = (left - right).abs() <= accuracy.abs();
        self.check(
            passed,
            "assert_eq_with_accuracy",
            || format!("(\"{left:?}\") is not equal to (\"{right:?}\") +/- (\"{accuracy:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_gt<T: PartialOrd + Debug>(&mut self, left: T, right: T, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            left > right,
            "assert_gt",
            || format!("(\"{left:?}\") is not greater than (\"{right:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_ge<T: PartialOrd + Debug>(&mut self, left: T, right: T, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            left >= right,
            "assert_ge",
            || format!("(\"{left:?}\") is less than (\"{right:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_lt<T: PartialOrd + Debug>(&mut self, left: T, right: T, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            left < right,
            "assert_lt",
            || format!("(\"{left:?}\") is not less than (\"{right:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_le<T: PartialOrd + Debug>(&mut self, left: T, right: T, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            left <= right,
            "assert_le",
            || format!("(\"{left:?}\") is greater than (\"{right:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_none<T: Debug>(&mut self, value: &Option<T>, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            value.is_none(),
            "assert_none",
            || format!("(\"{value:?}\")"),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_some<T>(&mut self, value: &Option<T>, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(value.is_some(), "assert_some", String::new, message, location)
    }

    #[track_caller]
    pub fn assert_err<T, E>(&mut self, result: &Result<T, E>, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(
            result.is_err(),
            "assert_err",
            || "did not return an error".into(),
            message,
            location,
        )
    }

    #[track_caller]
    pub fn assert_ok<T, E: Display>(&mut self, result: &Result<T, E>, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        let details = match result {
            Ok(_) => String::new(),
            Err(err) => format!("returned error \"{err}\""),
        };
        self.check(result.is_ok(), "assert_ok", || details, message, location)
    }

    /// Returns the contained value, or records a failure and stops the body.
    #[track_caller]
    pub fn unwrap<T>(&mut self, value: Option<T>, message: &str) -> TestResult<T> {
        let location = SourceLocation::caller();
        self.ensure_not_stopped()?;
        match value {
            Some(value) => Ok(value),
            None => {
                let details = format!(
                    "expected Some value of type {}",
                    std::any::type_name::<T>()
                );
                self.record_issue(
                    Issue::assertion_failure(describe("unwrap", &details, message))
                        .with_location(location),
                )?;
                Err(TestError::Stopped)
            }
        }
    }

    /// Records an unconditional failure.
    #[track_caller]
    pub fn fail(&mut self, message: &str) -> TestResult {
        let location = SourceLocation::caller();
        self.check(false, "fail", String::new, message, location)
    }
}
