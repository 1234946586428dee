//! Console reporter.
//!
//! Prints one line per lifecycle event, in the classic format:
//!
//! ```text
//! Test Suite 'Tests.Math' started at 2026-10-18 09:41:07.215
//! Test Case 'Math.test_sub' started at 2026-10-18 09:41:07.215
//! tests/math.rs:12: error: Math.test_sub : assert_eq failed: ("1") is not equal to ("0")
//! Test Case 'Math.test_sub' failed (0.001 seconds)
//! Test Suite 'Tests.Math' failed at 2026-10-18 09:41:07.216
//! 	 Executed 1 test, with 1 failure (0 unexpected) in 0.001 (0.001) seconds
//! ```

use chrono::{DateTime, Local};
use colored::Colorize;
use parking_lot::Mutex;
use rigor_core::{CaseRun, Issue, PerformanceResult, Skip, SourceLocation, SuiteRun, TestObserver};
use std::io::{self, Write};
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Writes test progress to a sink, stdout by default.
pub struct PrintObserver {
    sink: Mutex<Box<dyn Write + Send>>,
    color: bool,
}

impl PrintObserver {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
            color: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout()).with_color(true)
    }

    /// Colours the verdict words.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn print(&self, line: &str) {
        let mut sink = self.sink.lock();
        if let Err(err) = writeln!(sink, "{line}").and_then(|()| sink.flush()) {
            tracing::warn!(%err, "failed to write test progress");
        }
    }

    fn verdict(&self, word: &'static str) -> String {
        if !self.color {
            return word.to_string();
        }
        match word {
            "passed" => word.green().to_string(),
            "skipped" => word.yellow().to_string(),
            _ => word.red().bold().to_string(),
        }
    }
}

impl Default for PrintObserver {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for PrintObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintObserver")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

fn format_date(date: Option<DateTime<Local>>) -> String {
    date.unwrap_or_else(Local::now)
        .format(DATE_FORMAT)
        .to_string()
}

fn format_duration(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// `\t Executed ...` summary printed after a suite finishes.
pub fn suite_summary(suite: &SuiteRun) -> String {
    let failures = format!(
        "{} ({} unexpected)",
        plural(suite.total_failure_count(), "failure"),
        suite.unexpected_exception_count()
    );
    let with = if suite.skip_count() > 0 {
        format!(
            "with {} skipped and {failures}",
            plural(suite.skip_count(), "test")
        )
    } else {
        format!("with {failures}")
    };
    format!(
        "\t Executed {}, {with} in {} ({}) seconds",
        plural(suite.execution_count(), "test"),
        format_duration(suite.test_duration()),
        format_duration(suite.total_duration()),
    )
}

impl TestObserver for PrintObserver {
    fn suite_will_start(&self, suite: &SuiteRun) {
        self.print(&format!(
            "Test Suite '{}' started at {}",
            suite.name(),
            format_date(suite.times().start_date())
        ));
    }

    fn case_will_start(&self, case: &CaseRun) {
        self.print(&format!(
            "Test Case '{}' started at {}",
            case.name(),
            format_date(case.times().start_date())
        ));
    }

    fn case_did_fail(&self, case_name: &str, issue: &Issue) {
        let location = issue.location.clone().unwrap_or_else(SourceLocation::unknown);
        self.print(&format!(
            "{location}: error: {case_name} : {}",
            issue.compact_description
        ));
    }

    fn case_was_skipped(&self, case_name: &str, skip: &Skip) {
        self.print(&format!("{}: {case_name} : {}", skip.location, skip.summary()));
    }

    fn case_did_measure(&self, case_name: &str, result: &PerformanceResult) {
        self.print(&format!(
            "{}: Test Case '{case_name}' measured {}",
            result.location,
            result.summary()
        ));
    }

    fn case_did_finish(&self, case: &CaseRun) {
        let verdict = match (case.has_succeeded(), case.has_been_skipped()) {
            (true, true) => "skipped",
            (true, false) => "passed",
            (false, _) => "failed",
        };
        self.print(&format!(
            "Test Case '{}' {} ({} seconds)",
            case.name(),
            self.verdict(verdict),
            format_duration(case.duration())
        ));
    }

    fn suite_did_finish(&self, suite: &SuiteRun) {
        let verdict = if suite.has_succeeded() { "passed" } else { "failed" };
        self.print(&format!(
            "Test Suite '{}' {} at {}",
            suite.name(),
            self.verdict(verdict),
            format_date(suite.times().stop_date())
        ));
        self.print(&suite_summary(suite));
    }
}
