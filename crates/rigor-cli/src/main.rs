//! # rigor-sample
//!
//! A small test binary built on Rigor. It doubles as a smoke test of the
//! public API and as the subject of the CLI's end-to-end tests.
//!
//! ```bash
//! rigor-sample --list-tests
//! rigor-sample CartTests
//! rigor-sample CartTests/test_total,ClockTests
//! ```

use rigor_core::{
    ExpectedFailureOptions, Fixture, Notification, Predicate, TestCaseEntry, TestContext,
    TestResult,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct CartTests {
    items: Vec<(String, u32)>,
}

impl Fixture for CartTests {
    fn set_up(&mut self, _ctx: &mut TestContext<'_>) -> TestResult {
        self.items = vec![("apple".into(), 3), ("pear".into(), 4)];
        Ok(())
    }
}

impl CartTests {
    fn test_total(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        let total: u32 = self.items.iter().map(|(_, price)| price).sum();
        ctx.assert_eq(total, 7, "")
    }

    fn test_checkout_notifies(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        let checked_out = ctx.expectation_for_notification("cart.checked_out", Some("cart-1"), None);
        let center = Arc::clone(ctx.notification_center());
        let count = self.items.len();
        std::thread::spawn(move || {
            center.post(
                &Notification::new("cart.checked_out")
                    .with_object("cart-1")
                    .with_user_info("items", count.to_string()),
            );
        });
        ctx.wait(&[checked_out], Duration::from_secs(2));
        Ok(())
    }

    fn test_discount_rounding(&mut self, ctx: &mut TestContext<'_>) -> TestResult {
        ctx.expect_failure(
            "discounts are truncated",
            ExpectedFailureOptions::new(),
            |ctx| ctx.assert_eq(7 * 85 / 100, 6, "15% off"),
        )
    }
}

fn clock_ticks(ctx: &mut TestContext<'_>) -> TestResult {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let queue = ctx.main_queue();
    std::thread::spawn(move || {
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(5));
            let counter = Arc::clone(&counter);
            queue.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    let three = ctx.expectation_for_predicate(
        ticks,
        Predicate::new("three ticks", |ticks: &Arc<AtomicUsize>| {
            ticks.load(Ordering::SeqCst) >= 3
        }),
        None,
    );
    ctx.wait(&[three], Duration::from_secs(2));
    Ok(())
}

fn clock_ordering(ctx: &mut TestContext<'_>) -> TestResult {
    let opened = ctx.expectation("opened");
    let closed = ctx.expectation("closed");
    let (first, second) = (opened.clone(), closed.clone());
    std::thread::spawn(move || {
        first.fulfill();
        second.fulfill();
    });
    ctx.wait_enforcing_order(&[opened, closed], Duration::from_secs(2));
    Ok(())
}

fn entries() -> Vec<TestCaseEntry> {
    vec![
        TestCaseEntry::new("CartTests")
            .module("Shop")
            .fixture_test("test_total", CartTests::test_total)
            .fixture_test("test_checkout_notifies", CartTests::test_checkout_notifies)
            .fixture_test("test_discount_rounding", CartTests::test_discount_rounding),
        TestCaseEntry::new("ClockTests")
            .test("test_ticks", clock_ticks)
            .test("test_ordering", clock_ordering)
            .test("test_sorting_speed", |ctx| {
                ctx.measure(|_| {
                    let mut values: Vec<u32> = (0..2_000).rev().collect();
                    values.sort_unstable();
                    Ok(())
                })
            })
            .test("test_needs_network", |ctx| {
                ctx.skip_unless(std::env::var_os("RIGOR_SAMPLE_ONLINE").is_some(), "offline")
            }),
        TestCaseEntry::new("BrokenOnPurpose")
            .test("test_reports_failure", |ctx| ctx.assert_eq("left", "right", "demonstrates a failure")),
    ]
}

fn main() -> ExitCode {
    rigor_cli::run_main(&entries())
}
