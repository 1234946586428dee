//! Performance measurement.
//!
//! [`TestContext::measure`] runs a block a fixed number of times (see
//! `measure_iterations` in [`RigorConfig`](crate::RigorConfig)) and records
//! the wall-clock time of each iteration. When all iterations finish without
//! a failure, observers receive a [`PerformanceResult`], and a result whose
//! spread is too large records a performance regression.
//!
//! [`TestContext::measure_metrics`] with `automatically_start = false` lets
//! the block bracket the interesting part itself:
//!
//! ```
//! use rigor_core::{PerformanceMetric, RunEnvironment, TestCase};
//!
//! let case = TestCase::new("PerfTests", "test_sort", |ctx| {
//!     ctx.measure_metrics(&[PerformanceMetric::wall_clock_time()], false, |ctx| {
//!         let mut data: Vec<u32> = (0..1_000).rev().collect();
//!         ctx.start_measuring()?;
//!         data.sort_unstable();
//!         ctx.stop_measuring()
//!     })
//! });
//! let env = RunEnvironment::default();
//! assert_eq!(case.run(&env).unexpected_exception_count(), 0);
//! ```

use crate::context::TestContext;
use rigor_proto::{Issue, IssueKind, SourceLocation, TestResult};
use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of something a test can measure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerformanceMetric(Cow<'static, str>);

impl PerformanceMetric {
    pub const WALL_CLOCK_TIME: &'static str = "rigor.metric.wall_clock_time";

    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self(id.into())
    }

    pub fn wall_clock_time() -> Self {
        Self(Cow::Borrowed(Self::WALL_CLOCK_TIME))
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// Only wall-clock time can be measured.
    pub fn is_known(&self) -> bool {
        self.0 == Self::WALL_CLOCK_TIME
    }
}

impl fmt::Display for PerformanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Measurements of one metric across all iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceResult {
    pub metric: PerformanceMetric,

    /// One value per iteration, in seconds.
    pub values: Vec<f64>,

    /// Percent.
    pub max_relative_std_dev: f64,

    /// Seconds.
    pub max_std_dev: f64,

    /// Where `measure` was called.
    pub location: SourceLocation,
}

impl PerformanceResult {
    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let average = self.average();
        let variance = self
            .values
            .iter()
            .map(|v| (v - average).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        variance.sqrt()
    }

    /// Standard deviation as a percentage of the average.
    pub fn relative_std_dev(&self) -> f64 {
        let average = self.average();
        if average == 0.0 {
            return 0.0;
        }
        self.std_dev() / average * 100.0
    }

    /// Both the relative and the absolute spread exceed their limits.
    pub fn is_regression(&self) -> bool {
        self.relative_std_dev() > self.max_relative_std_dev && self.std_dev() > self.max_std_dev
    }

    pub fn summary(&self) -> String {
        let values: Vec<String> = self.values.iter().map(|v| format!("{v:.6}")).collect();
        format!(
            "[Time, seconds] average: {:.3}, relative standard deviation: {:.3}%, values: [{}], performanceMetricID:{}, maxPercentRelativeStandardDeviation: {:.3}%, maxStandardDeviation: {:.3}",
            self.average(),
            self.relative_std_dev(),
            values.join(", "),
            self.metric,
            self.max_relative_std_dev,
            self.max_std_dev,
        )
    }

    fn regression_issue(&self) -> Issue {
        Issue::new(
            IssueKind::PerformanceRegression,
            format!(
                "failed: The relative standard deviation of the measurements is {:.3}% which is higher than the max allowed of {:.3}%.",
                self.relative_std_dev(),
                self.max_relative_std_dev
            ),
        )
        .with_location(self.location.clone())
    }
}

#[derive(Debug, Default)]
struct Iteration {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl Iteration {
    /// The measured span, closing a start that was never stopped.
    fn finish(self) -> Option<Duration> {
        match (self.started, self.elapsed) {
            (_, Some(elapsed)) => Some(elapsed),
            (Some(started), None) => Some(started.elapsed()),
            (None, None) => None,
        }
    }
}

/// Measurement bookkeeping of one test case.
#[derive(Debug, Default)]
pub(crate) struct PerformanceMeter {
    has_measured: bool,
    iteration: Option<Iteration>,
}

fn api_violation(message: &str, location: SourceLocation) -> Issue {
    Issue::api_violation(format!("API violation - {message}")).with_location(location)
}

impl TestContext<'_> {
    /// Measures the wall-clock time of `block` over several iterations.
    #[track_caller]
    pub fn measure(&mut self, block: impl FnMut(&mut Self) -> TestResult) -> TestResult {
        let location = SourceLocation::caller();
        self.measure_at(&[PerformanceMetric::wall_clock_time()], true, block, location)
    }

    /// Measures `metrics` over several iterations of `block`.
    ///
    /// Without `automatically_start`, the block calls
    /// [`start_measuring`](Self::start_measuring) and optionally
    /// [`stop_measuring`](Self::stop_measuring) itself. An error returned by
    /// the block ends the measurement and is propagated.
    #[track_caller]
    pub fn measure_metrics(
        &mut self,
        metrics: &[PerformanceMetric],
        automatically_start: bool,
        block: impl FnMut(&mut Self) -> TestResult,
    ) -> TestResult {
        let location = SourceLocation::caller();
        self.measure_at(metrics, automatically_start, block, location)
    }

    fn measure_at(
        &mut self,
        metrics: &[PerformanceMetric],
        automatically_start: bool,
        mut block: impl FnMut(&mut Self) -> TestResult,
        location: SourceLocation,
    ) -> TestResult {
        if self.meter.has_measured {
            return self.record_issue(api_violation(
                "Can only record one set of metrics per test method.",
                location,
            ));
        }
        let Some(metric) = metrics.first() else {
            return self.record_issue(api_violation(
                "At least one metric must be provided to measure.",
                location,
            ));
        };
        if let Some(unknown) = metrics.iter().find(|m| !m.is_known()) {
            return self.record_issue(api_violation(
                &format!("Unknown metric: {unknown}"),
                location,
            ));
        }
        self.meter.has_measured = true;

        let iterations = self.config().measure_iterations;
        let failures_before = self.total_failure_count();
        let mut values = Vec::with_capacity(iterations);

        for _ in 0..iterations {
            self.meter.iteration = Some(Iteration {
                started: automatically_start.then(Instant::now),
                elapsed: None,
            });
            let outcome = block(self);
            let iteration = self.meter.iteration.take().unwrap_or_default();
            outcome?;

            if self.total_failure_count() > failures_before {
                tracing::debug!(test = %self.name(), "measurement aborted after a failure");
                return self.ensure_not_stopped();
            }
            match iteration.finish() {
                Some(elapsed) => values.push(elapsed.as_secs_f64()),
                None => {
                    return self.record_issue(api_violation(
                        "start_measuring() must be called during the block.",
                        location,
                    ));
                }
            }
        }

        let result = PerformanceResult {
            metric: metric.clone(),
            values,
            max_relative_std_dev: self.config().max_relative_std_dev,
            max_std_dev: self.config().max_std_dev,
            location,
        };
        tracing::debug!(test = %self.name(), average = result.average(), "measured");
        self.env().observers().case_did_measure(self.name(), &result);

        if result.is_regression() {
            return self.record_issue(result.regression_issue());
        }
        Ok(())
    }

    /// Starts the clock for this iteration of a `measure_metrics` block.
    #[track_caller]
    pub fn start_measuring(&mut self) -> TestResult {
        let location = SourceLocation::caller();
        let message = match self.meter.iteration.as_mut() {
            None => {
                "Cannot start measuring. start_measuring() is only supported from a block passed to measure_metrics(...)."
            }
            Some(iteration) if iteration.started.is_some() => {
                "Already called start_measuring() once this iteration."
            }
            Some(iteration) => {
                iteration.started = Some(Instant::now());
                return Ok(());
            }
        };
        self.record_issue(api_violation(message, location))
    }

    /// Stops the clock for this iteration of a `measure_metrics` block.
    #[track_caller]
    pub fn stop_measuring(&mut self) -> TestResult {
        let location = SourceLocation::caller();
        let message = match self.meter.iteration.as_mut() {
            None => {
                "Cannot stop measuring. stop_measuring() is only supported from a block passed to measure_metrics(...)."
            }
            Some(iteration) if iteration.elapsed.is_some() => {
                "Already called stop_measuring() once this iteration."
            }
            Some(Iteration {
                started: Some(started),
                elapsed,
            }) => {
                *elapsed = Some(started.elapsed());
                return Ok(());
            }
            Some(_) => "Cannot stop measuring before starting measuring.",
        };
        self.record_issue(api_violation(message, location))
    }
}
