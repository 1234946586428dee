//! The run environment shared by every test of a run.

use crate::config::RigorConfig;
use crate::notification::NotificationCenter;
use crate::observation::{ObservationCenter, ObserverId, TestObserver};
use crate::run_loop::{MainQueue, RunLoop};
use crate::subsystem::Subsystem;
use crate::suite::TestSuite;
use crate::test_run::TestRun;
use std::sync::Arc;

/// Everything a run needs: configuration, the primary-thread run loop, the
/// shared subsystem state, and the observation and notification centers.
///
/// A `RunEnvironment` lives on the primary thread. Other threads reach it
/// through [`MainQueue`], [`CaseHandle`](crate::CaseHandle) and the
/// `Arc`-shared centers.
pub struct RunEnvironment {
    config: RigorConfig,
    run_loop: RunLoop,
    subsystem: Arc<Subsystem>,
    observers: Arc<ObservationCenter>,
    notifications: Arc<NotificationCenter>,
}

impl RunEnvironment {
    pub fn new(config: RigorConfig) -> Self {
        let run_loop = RunLoop::new();
        let observers = Arc::new(ObservationCenter::new());
        let subsystem = Arc::new(Subsystem::new(
            Arc::clone(&observers),
            run_loop.main_queue(),
        ));
        Self {
            config,
            run_loop,
            subsystem,
            observers,
            notifications: Arc::new(NotificationCenter::new()),
        }
    }

    pub fn config(&self) -> &RigorConfig {
        &self.config
    }

    pub fn run_loop(&self) -> &RunLoop {
        &self.run_loop
    }

    pub fn main_queue(&self) -> MainQueue {
        self.run_loop.main_queue()
    }

    pub fn observers(&self) -> &Arc<ObservationCenter> {
        &self.observers
    }

    pub fn add_observer(&self, observer: Arc<dyn TestObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn notification_center(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub(crate) fn subsystem(&self) -> &Arc<Subsystem> {
        &self.subsystem
    }

    /// Runs `suite` as a whole bundle, bracketed by the bundle events.
    pub fn run_bundle(&self, suite: &TestSuite) -> TestRun {
        let bundle = self.config.bundle_suite_name();
        tracing::debug!(%bundle, tests = suite.test_case_count(), "bundle starting");
        self.observers.bundle_will_start(&bundle);

        let run = suite.run(self);

        self.observers.bundle_did_finish(&bundle);
        tracing::debug!(
            %bundle,
            executed = run.execution_count(),
            failures = run.total_failure_count(),
            "bundle finished"
        );
        run
    }
}

impl Default for RunEnvironment {
    fn default() -> Self {
        Self::new(RigorConfig::default())
    }
}

impl std::fmt::Debug for RunEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEnvironment")
            .field("config", &self.config)
            .field("run_loop", &self.run_loop)
            .field("observers", &self.observers)
            .field("notifications", &self.notifications)
            .finish_non_exhaustive()
    }
}
