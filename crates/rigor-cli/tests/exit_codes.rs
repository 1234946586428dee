mod common;

use common::{entries, run};
use rigor_core::TestCaseEntry;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_sample(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rigor-sample"))
        .args(args)
        .arg("--no-color")
        .env_remove("RIGOR_LOG")
        .output()
        .expect("execute rigor-sample")
}

#[test]
fn test_all_passing_exits_zero() {
    let (code, _) = run(&["Math/test_add"], &entries());
    assert_eq!(code, 0);
}

#[test]
fn test_any_failure_exits_one() {
    let (code, _) = run(&["Math"], &entries());
    assert_eq!(code, 1);
}

#[test]
fn test_skips_alone_exit_zero() {
    let (code, _) = run(&["Net.Network"], &entries());
    assert_eq!(code, 0);
}

#[test]
fn test_selection_matching_nothing_exits_zero() {
    let (code, output) = run(&["Math/test_add/extra"], &entries());
    assert_eq!(code, 0);
    assert!(output.contains("Executed 0 tests, with 0 failures (0 unexpected)"), "{output}");
}

#[test]
fn test_unexpected_failure_exits_one() {
    let entries = vec![TestCaseEntry::new("Misuse").test("test_empty_wait", |ctx| {
        ctx.wait(&[], std::time::Duration::from_millis(10));
        Ok(())
    })];
    let (code, _) = run(&[], &entries);
    assert_eq!(code, 1);
}

#[test]
fn test_sample_binary_passing_selection() {
    let output = run_sample(&["Shop.CartTests,ClockTests"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(0), "stdout:\n{stdout}");
    assert!(stdout.contains("Test Case 'CartTests.test_total' passed ("));
    assert!(stdout.contains("Test Case 'ClockTests.test_needs_network' skipped ("));
}

#[test]
fn test_sample_binary_failing_selection() {
    let output = run_sample(&["BrokenOnPurpose"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stdout:\n{stdout}");
    assert!(stdout.contains(": error: BrokenOnPurpose.test_reports_failure : assert_eq failed"));
}

#[test]
fn test_sample_binary_bad_config_reports_error() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("rigor.yml");
    std::fs::write(&config, "poll_interval_ms: [not, a, number]\n").expect("write config");

    let output = run_sample(&["--config", config.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"), "stderr:\n{stderr}");
}
