//! Predicate-driven expectations.
//!
//! The predicate is evaluated once when the expectation is created and then on
//! a run-loop timer, so it always runs on the primary thread. The timer stops
//! once the expectation is fulfilled and is cancelled when the expectation is
//! cleaned up.

use crate::expectation::Expectation;
use crate::run_loop::{RunLoop, TimerControl};
use std::fmt;
use std::time::Duration;

/// A labelled condition on a value of type `T`.
pub struct Predicate<T> {
    label: String,
    test: Box<dyn Fn(&T) -> bool>,
}

impl<T> Predicate<T> {
    pub fn new(label: impl Into<String>, test: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            label: label.into(),
            test: Box::new(test),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn evaluate(&self, target: &T) -> bool {
        (self.test)(target)
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Decides whether a satisfied predicate fulfils its expectation.
pub type PredicateHandler = Box<dyn FnMut() -> bool>;

pub(crate) fn predicate_description<T: fmt::Debug>(predicate: &Predicate<T>, target: &T) -> String {
    format!("Expect `{}` for object {target:?}", predicate.label)
}

/// Evaluates now, then every `interval` on `run_loop` until fulfilled.
pub(crate) fn observe_predicate<T: 'static>(
    run_loop: &RunLoop,
    interval: Duration,
    expectation: &Expectation,
    target: T,
    predicate: Predicate<T>,
    mut handler: Option<PredicateHandler>,
) {
    let exp = expectation.clone();
    let mut check = move || {
        if exp.is_fulfilled() {
            return true;
        }
        if !predicate.evaluate(&target) {
            return false;
        }
        let accepted = handler.as_mut().is_none_or(|handler| handler());
        if accepted {
            exp.fulfill();
        }
        accepted
    };

    if check() {
        return;
    }

    let timer = run_loop.schedule_timer(interval, move || {
        if check() {
            TimerControl::Stop
        } else {
            TimerControl::Continue
        }
    });
    expectation.on_cleanup(move || timer.cancel());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_true_predicate_fulfils_immediately() {
        let run_loop = RunLoop::new();
        let predicate = Predicate::new("is even", |v: &i32| v % 2 == 0);
        let expectation = Expectation::new(predicate_description(&predicate, &4));

        observe_predicate(&run_loop, Duration::from_millis(1), &expectation, 4, predicate, None);
        assert!(expectation.is_fulfilled());
        assert_eq!(run_loop.timer_count(), 0);
    }

    #[test]
    fn test_predicate_is_polled_until_true() {
        let run_loop = RunLoop::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let expectation = Expectation::new("count reaches 3");

        let bump = Arc::clone(&counter);
        run_loop.schedule_timer(Duration::from_millis(1), move || {
            bump.fetch_add(1, Ordering::SeqCst);
            TimerControl::Continue
        });
        observe_predicate(
            &run_loop,
            Duration::from_millis(1),
            &expectation,
            Arc::clone(&counter),
            Predicate::new("at least 3", |c: &Arc<AtomicUsize>| c.load(Ordering::SeqCst) >= 3),
            None,
        );
        assert!(!expectation.is_fulfilled());

        let deadline = Instant::now() + Duration::from_secs(2);
        while !expectation.is_fulfilled() && Instant::now() < deadline {
            run_loop.run_once(Duration::from_millis(5));
        }
        assert!(expectation.is_fulfilled());
    }

    #[test]
    fn test_rejecting_handler_keeps_expectation_pending() {
        let run_loop = RunLoop::new();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let expectation = Expectation::new("rejected");

        observe_predicate(
            &run_loop,
            Duration::from_millis(1),
            &expectation,
            (),
            Predicate::new("always", |_: &()| true),
            Some(Box::new(move || {
                seen.set(seen.get() + 1);
                false
            })),
        );

        run_loop.run_until(Instant::now() + Duration::from_millis(20));
        assert!(!expectation.is_fulfilled());
        assert!(calls.get() > 1);

        expectation.clean_up();
        assert_eq!(run_loop.timer_count(), 0);
    }

    #[test]
    fn test_description_uses_label_and_debug_target() {
        let predicate = Predicate::new("len > 2", |s: &String| s.len() > 2);
        assert_eq!(
            predicate_description(&predicate, &"ab".to_string()),
            "Expect `len > 2` for object \"ab\""
        );
    }
}
