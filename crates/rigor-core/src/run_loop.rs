//! Primary-thread scheduler.
//!
//! The [`RunLoop`] is the explicit scheduler tick that waits are built on. One
//! tick:
//!
//! ```text
//!   ┌──────────────┐    ┌──────────────┐    ┌──────────────────────────┐
//!   │ drain queued │───▶│  fire due    │───▶│ park until woken, next   │
//!   │ main tasks   │    │  timers      │    │ timer, or max wait       │
//!   └──────────────┘    └──────────────┘    └──────────────────────────┘
//! ```
//!
//! Other threads reach the primary thread through a [`MainQueue`] handle:
//! dispatched closures run during the next tick, and [`MainQueue::wake`] cuts a
//! park short so a waiter re-checks its expectations promptly.
//!
//! # Example
//!
//! ```
//! use rigor_core::RunLoop;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::time::Duration;
//!
//! let run_loop = RunLoop::new();
//! let ran = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&ran);
//!
//! let queue = run_loop.main_queue();
//! std::thread::spawn(move || queue.dispatch(move || flag.store(true, Ordering::SeqCst)))
//!     .join()
//!     .unwrap();
//!
//! run_loop.run_once(Duration::from_millis(50));
//! assert!(ran.load(Ordering::SeqCst));
//! ```

use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Stands in for "never" when an interval is too large to add to now.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// `from + after`, capped at a year out instead of overflowing.
pub(crate) fn deadline_after(from: Instant, after: Duration) -> Instant {
    from.checked_add(after.min(FAR_FUTURE))
        .unwrap_or(from)
}

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    signalled: bool,
}

#[derive(Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    ready: Condvar,
}

/// Cross-thread handle for scheduling work on the primary thread.
#[derive(Clone, Default)]
pub struct MainQueue {
    inner: Arc<QueueInner>,
}

impl MainQueue {
    /// Queues `task` to run on the primary thread during the next tick.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.inner.state.lock();
            state.tasks.push_back(Box::new(task));
            state.signalled = true;
        }
        self.inner.ready.notify_one();
    }

    /// Interrupts a parked run loop without queueing work.
    pub fn wake(&self) {
        {
            let mut state = self.inner.state.lock();
            state.signalled = true;
        }
        self.inner.ready.notify_one();
    }

    pub(crate) fn same_queue(&self, other: &MainQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    fn take_tasks(&self) -> VecDeque<Task> {
        let mut state = self.inner.state.lock();
        std::mem::take(&mut state.tasks)
    }

    /// Parks until signalled or `deadline`. Returns true when signalled.
    fn park_until(&self, deadline: Instant) -> bool {
        let mut state = self.inner.state.lock();
        while !state.signalled {
            if self.inner.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut state.signalled, false)
    }
}

impl std::fmt::Debug for MainQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

/// What a timer callback wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerControl {
    Continue,
    Stop,
}

/// Cancellation handle for a scheduled timer. Safe to use from any thread.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct Timer {
    next_fire: Instant,
    interval: Duration,
    handle: TimerHandle,
    callback: Box<dyn FnMut() -> TimerControl>,
}

/// Primary-thread task queue and timer wheel.
///
/// A `RunLoop` is not `Sync`: timers and their callbacks stay on the thread
/// that owns the loop. Use [`RunLoop::main_queue`] to reach it from elsewhere.
pub struct RunLoop {
    queue: MainQueue,
    timers: RefCell<Vec<Timer>>,
}

impl RunLoop {
    pub fn new() -> Self {
        Self {
            queue: MainQueue::default(),
            timers: RefCell::new(Vec::new()),
        }
    }

    /// Returns a sendable handle to this loop's task queue.
    pub fn main_queue(&self) -> MainQueue {
        self.queue.clone()
    }

    /// Schedules `callback` to fire every `interval`, first after one interval.
    pub fn schedule_timer(
        &self,
        interval: Duration,
        callback: impl FnMut() -> TimerControl + 'static,
    ) -> TimerHandle {
        let handle = TimerHandle::default();
        self.timers.borrow_mut().push(Timer {
            next_fire: deadline_after(Instant::now(), interval),
            interval,
            handle: handle.clone(),
            callback: Box::new(callback),
        });
        handle
    }

    /// Number of timers that have not stopped or been cancelled.
    pub fn timer_count(&self) -> usize {
        self.timers
            .borrow()
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Runs one scheduler tick, parking for at most `max_wait`.
    ///
    /// Returns early as soon as any work ran or the queue was signalled, so
    /// the caller can re-check whatever it is waiting for.
    pub fn run_once(&self, max_wait: Duration) {
        if self.run_ready_work() {
            return;
        }

        let mut deadline = deadline_after(Instant::now(), max_wait);
        if let Some(next_timer) = self.next_timer_fire() {
            deadline = deadline.min(next_timer);
        }

        self.queue.park_until(deadline);
        self.run_ready_work();
    }

    /// Ticks until `deadline` passes.
    pub fn run_until(&self, deadline: Instant) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.run_once(deadline - now);
        }
    }

    /// Drains queued tasks and fires due timers. Returns true if anything ran.
    fn run_ready_work(&self) -> bool {
        let tasks = self.queue.take_tasks();
        let ran_tasks = !tasks.is_empty();
        for task in tasks {
            task();
        }
        let fired = self.fire_due_timers();
        ran_tasks || fired
    }

    fn fire_due_timers(&self) -> bool {
        // Callbacks may schedule new timers, so the list is taken out while firing.
        let timers = std::mem::take(&mut *self.timers.borrow_mut());
        let now = Instant::now();
        let mut fired = false;
        let mut survivors = Vec::with_capacity(timers.len());

        for mut timer in timers {
            if timer.handle.is_cancelled() {
                continue;
            }
            if timer.next_fire > now {
                survivors.push(timer);
                continue;
            }
            fired = true;
            match (timer.callback)() {
                TimerControl::Continue if !timer.handle.is_cancelled() => {
                    timer.next_fire = deadline_after(now, timer.interval);
                    survivors.push(timer);
                }
                _ => timer.handle.cancel(),
            }
        }

        self.timers.borrow_mut().extend(survivors);
        fired
    }

    fn next_timer_fire(&self) -> Option<Instant> {
        self.timers
            .borrow()
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .map(|t| t.next_fire)
            .min()
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoop")
            .field("queue", &self.queue)
            .field("timers", &self.timer_count())
            .finish()
    }
}
