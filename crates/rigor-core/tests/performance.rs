use parking_lot::Mutex;
use rigor_core::{
    IssueKind, PerformanceMetric, PerformanceResult, RigorConfig, RunEnvironment, TestCase,
    TestContext, TestObserver, TestResult, TestRun,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Default)]
struct Measurements(Mutex<Vec<(String, PerformanceResult)>>);

impl TestObserver for Measurements {
    fn case_did_measure(&self, case_name: &str, result: &PerformanceResult) {
        self.0.lock().push((case_name.to_string(), result.clone()));
    }
}

fn run_measured(
    iterations: usize,
    body: impl Fn(&mut TestContext<'_>) -> TestResult + 'static,
) -> (TestRun, Arc<Measurements>) {
    let config = RigorConfig {
        measure_iterations: iterations,
        ..RigorConfig::default()
    };
    let env = RunEnvironment::new(config);
    let measurements = Arc::new(Measurements::default());
    env.add_observer(measurements.clone());
    let run = TestCase::new("Perf", "test_measure", body).run(&env);
    (run, measurements)
}

fn descriptions(run: &TestRun) -> Vec<String> {
    run.as_case()
        .map(|case| {
            case.issues()
                .iter()
                .map(|issue| issue.compact_description.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn test_measure_runs_configured_iterations() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let (run, measurements) = run_measured(5, move |ctx| {
        ctx.measure(|_| {
            counter.set(counter.get() + 1);
            Ok(())
        })
    });

    assert!(run.has_succeeded(), "{:?}", descriptions(&run));
    assert_eq!(calls.get(), 5);

    let measured = measurements.0.lock();
    assert_eq!(measured.len(), 1);
    assert_eq!(measured[0].0, "Perf.test_measure");
    assert_eq!(measured[0].1.values.len(), 5);
    assert_eq!(measured[0].1.metric, PerformanceMetric::wall_clock_time());
    assert!(measured[0].1.location.file.ends_with("performance.rs"));
}

#[test]
fn test_manual_start_and_stop() {
    let (run, measurements) = run_measured(3, |ctx| {
        ctx.measure_metrics(&[PerformanceMetric::wall_clock_time()], false, |ctx| {
            let setup: u64 = (0..1_000).sum();
            ctx.start_measuring()?;
            let work: u64 = (0..setup).take(10).sum();
            ctx.stop_measuring()?;
            ctx.assert_gt(work, 0, "")
        })
    });

    assert!(run.has_succeeded(), "{:?}", descriptions(&run));
    assert_eq!(measurements.0.lock()[0].1.values.len(), 3);
}

#[test]
fn test_block_that_never_starts_is_a_violation() {
    let (run, measurements) = run_measured(3, |ctx| {
        ctx.measure_metrics(&[PerformanceMetric::wall_clock_time()], false, |_| Ok(()))
    });

    assert_eq!(
        descriptions(&run),
        vec!["API violation - start_measuring() must be called during the block."]
    );
    assert!(measurements.0.lock().is_empty());
}

#[test]
fn test_only_one_measurement_per_test() {
    let (run, measurements) = run_measured(2, |ctx| {
        ctx.measure(|_| Ok(()))?;
        ctx.measure(|_| Ok(()))
    });

    assert_eq!(
        descriptions(&run),
        vec!["API violation - Can only record one set of metrics per test method."]
    );
    assert_eq!(measurements.0.lock().len(), 1);
}

#[test]
fn test_unknown_metric_is_rejected() {
    let (run, _) = run_measured(2, |ctx| {
        ctx.measure_metrics(&[PerformanceMetric::new("custom.heap")], true, |_| Ok(()))
    });

    assert_eq!(
        descriptions(&run),
        vec!["API violation - Unknown metric: custom.heap"]
    );
    assert_eq!(run.as_case().unwrap().issues()[0].kind, IssueKind::ApiViolation);
}

#[test]
fn test_start_outside_measure_block_is_a_violation() {
    let (run, _) = run_measured(2, |ctx| ctx.start_measuring());

    assert_eq!(
        descriptions(&run),
        vec![
            "API violation - Cannot start measuring. start_measuring() is only supported from a block passed to measure_metrics(...)."
        ]
    );
}

#[test]
fn test_failure_in_block_aborts_measurement() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let (run, measurements) = run_measured(10, move |ctx| {
        ctx.measure(|ctx| {
            counter.set(counter.get() + 1);
            ctx.assert_true(counter.get() < 2, "second iteration fails")
        })
    });

    assert_eq!(calls.get(), 2);
    assert_eq!(run.failure_count(), 1);
    assert!(measurements.0.lock().is_empty());
}

#[test]
fn test_error_in_block_is_propagated() {
    let (run, measurements) = run_measured(4, |ctx| {
        ctx.measure(|_| {
            "not a number".parse::<i32>()?;
            Ok(())
        })
    });

    assert_eq!(run.unexpected_exception_count(), 1);
    assert_eq!(run.as_case().unwrap().issues()[0].kind, IssueKind::ThrownError);
    assert!(measurements.0.lock().is_empty());
}
