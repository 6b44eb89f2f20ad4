//! Check registry and scheduling.
//!
//! The `Controller` is the control loop that:
//! - Accepts check definitions and installs one fixed-rate schedule each
//! - Reserves the check's execution slot before every dispatch
//! - Folds executor results into the check's status
//! - Answers aggregate health queries for the HTTP surface

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use healthgrid_executor::CheckExecutor;
use healthgrid_model::{CheckResult, HealthCheck};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ControllerError, ControllerResult};
use crate::slot::ExecutionSlot;

type SharedCheck = Arc<Mutex<HealthCheck>>;

fn lock(check: &SharedCheck) -> MutexGuard<'_, HealthCheck> {
    check.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background timer for one check.
struct Schedule {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Schedule {
    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

/// Per-check registry entry.
struct CheckEntry {
    /// Definition and status. Never locked across an await.
    check: SharedCheck,
    /// Shared with `Inner::slots`, so it outlives this entry.
    slot: Arc<ExecutionSlot>,
    /// `None` once the controller is shut down.
    schedule: Option<Schedule>,
}

struct Inner {
    executor: Arc<dyn CheckExecutor>,
    checks: RwLock<HashMap<String, CheckEntry>>,
    /// One slot per name ever registered. Never pruned, so an execution
    /// started before `unregister` still blocks the next registration.
    slots: Mutex<HashMap<String, Arc<ExecutionSlot>>>,
    /// Completion handlers still folding results.
    completions: TaskTracker,
    closed: AtomicBool,
}

/// Owns the registry of checks and their schedules.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Create an empty controller dispatching through `executor`.
    pub fn new(executor: Arc<dyn CheckExecutor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                checks: RwLock::new(HashMap::new()),
                slots: Mutex::new(HashMap::new()),
                completions: TaskTracker::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a check, replacing any existing definition with that name.
    ///
    /// The previous schedule is stopped before the new one is installed,
    /// both under the registry write lock. The first run fires right away.
    pub async fn register(&self, check: HealthCheck) -> ControllerResult<()> {
        check.validate()?;
        let name = check.name.clone();
        let period = Duration::from_secs(check.run_interval_seconds);

        let mut checks = self.inner.checks.write().await;
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ControllerError::ShutDown);
        }

        if let Some(previous) = checks.remove(&name) {
            if let Some(schedule) = previous.schedule {
                schedule.stop();
            }
            info!(check = %name, "replacing existing check definition");
        }
        let slot = self.inner.slot_for(&name);

        let schedule = spawn_schedule(Arc::downgrade(&self.inner), name.clone(), period);
        checks.insert(
            name.clone(),
            CheckEntry {
                check: Arc::new(Mutex::new(check)),
                slot,
                schedule: Some(schedule),
            },
        );

        info!(check = %name, interval_secs = period.as_secs(), "check registered");
        Ok(())
    }

    /// Stop the schedule and forget the check. In-flight executions run on
    /// and keep the name's slot reserved until they finish.
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.inner.checks.write().await.remove(name);
        match removed {
            Some(entry) => {
                if let Some(schedule) = entry.schedule {
                    schedule.stop();
                }
                info!(check = %name, "check unregistered");
                true
            }
            None => false,
        }
    }

    /// Trigger one run outside the schedule.
    ///
    /// The returned handle yields `None` right away when the check is
    /// unknown or already running, or the controller is shut down.
    pub async fn run_now(&self, name: &str) -> RunHandle {
        info!(check = %name, "manual run requested");
        self.inner.trigger(name).await
    }

    /// Cancel the in-flight execution with this UUID.
    pub fn cancel(&self, uuid: &Uuid) -> bool {
        self.inner.executor.cancel(uuid)
    }

    /// True iff every registered check is ok. An empty registry is healthy.
    pub async fn is_healthy(&self) -> bool {
        let checks = self.inner.checks.read().await;
        checks.values().all(|entry| lock(&entry.check).status.ok)
    }

    pub async fn failing_count(&self) -> usize {
        let checks = self.inner.checks.read().await;
        checks
            .values()
            .filter(|entry| !lock(&entry.check).status.ok)
            .count()
    }

    /// Snapshot of one check.
    pub async fn get(&self, name: &str) -> Option<HealthCheck> {
        let checks = self.inner.checks.read().await;
        checks.get(name).map(|entry| lock(&entry.check).clone())
    }

    /// Snapshot of every check, sorted by name.
    pub async fn list(&self) -> Vec<HealthCheck> {
        let checks = self.inner.checks.read().await;
        let mut all: Vec<HealthCheck> = checks
            .values()
            .map(|entry| lock(&entry.check).clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub async fn check_count(&self) -> usize {
        self.inner.checks.read().await.len()
    }

    /// Number of live schedule timers.
    pub async fn active_schedules(&self) -> usize {
        let checks = self.inner.checks.read().await;
        checks
            .values()
            .filter(|entry| {
                entry
                    .schedule
                    .as_ref()
                    .is_some_and(|s| !s.handle.is_finished())
            })
            .count()
    }

    /// Stop all schedules, shut the executor down and wait for pending
    /// results to be folded. Registered checks stay queryable.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        {
            let mut checks = self.inner.checks.write().await;
            for (name, entry) in checks.iter_mut() {
                if let Some(schedule) = entry.schedule.take() {
                    schedule.stop();
                    debug!(check = %name, "schedule stopped");
                }
            }
        }

        self.inner.executor.shutdown().await;
        self.inner.completions.close();
        self.inner.completions.wait().await;
        info!("controller stopped");
    }
}

impl Inner {
    fn slot_for(&self, name: &str) -> Arc<ExecutionSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ExecutionSlot::new()))
            .clone()
    }

    /// Reserve the slot, dispatch, and hand the result to a completion task.
    async fn trigger(&self, name: &str) -> RunHandle {
        if self.closed.load(Ordering::Acquire) {
            debug!(check = %name, "controller shut down, trigger ignored");
            return RunHandle::skipped();
        }

        let (check, slot) = {
            let checks = self.checks.read().await;
            match checks.get(name) {
                Some(entry) => (entry.check.clone(), entry.slot.clone()),
                None => {
                    debug!(check = %name, "trigger for unknown check ignored");
                    return RunHandle::skipped();
                }
            }
        };

        let Some(permit) = slot.try_acquire() else {
            debug!(check = %name, "check already running, trigger skipped");
            return RunHandle::skipped();
        };

        let snapshot = {
            let mut check = lock(&check);
            check.status.begin_run(Utc::now());
            check.clone()
        };
        let handle = self.executor.execute(&snapshot);
        lock(&check).status.attach_execution(handle.uuid());

        let join = self.completions.spawn(async move {
            let outcome = handle.await;
            let result = {
                let mut check = lock(&check);
                match outcome {
                    Ok(result) => {
                        check.status.record_result(&result, Utc::now());
                        Some(result)
                    }
                    Err(e) => {
                        warn!(check = %check.name, error = %e, "execution failed to produce a result");
                        check.status.record_dispatch_error(&e.to_string());
                        None
                    }
                }
            };
            drop(permit);
            result
        });
        RunHandle::dispatched(join)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.checks.get_mut().values_mut() {
            if let Some(schedule) = entry.schedule.take() {
                schedule.stop();
            }
        }
    }
}

/// Fixed-rate timer for one check. The first tick is immediate.
fn spawn_schedule(inner: Weak<Inner>, name: String, period: Duration) -> Schedule {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        debug!(check = %name, period_secs = period.as_secs(), "schedule starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.trigger(&name).await;
                }
                _ = shutdown_rx.changed() => {
                    debug!(check = %name, "schedule shutting down");
                    break;
                }
            }
        }
    });

    Schedule {
        handle,
        shutdown_tx,
    }
}

/// Result of [`Controller::run_now`].
///
/// Resolves to the result after the status has been updated, or to
/// `None` when nothing was dispatched or the dispatch failed.
#[derive(Debug)]
pub struct RunHandle {
    join: Option<JoinHandle<Option<CheckResult>>>,
}

impl RunHandle {
    fn skipped() -> Self {
        Self { join: None }
    }

    fn dispatched(join: JoinHandle<Option<CheckResult>>) -> Self {
        Self { join: Some(join) }
    }

    /// Whether an execution was started for this trigger.
    pub fn is_dispatched(&self) -> bool {
        self.join.is_some()
    }
}

impl Future for RunHandle {
    type Output = Option<CheckResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().join {
            None => Poll::Ready(None),
            Some(join) => Pin::new(join).poll(cx).map(|r| r.ok().flatten()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use healthgrid_executor::{ExecutorConfig, MemoryBackend, PodExecutor, UnitBehavior};
    use healthgrid_model::CheckState;

    fn setup(poll: Duration, behavior: UnitBehavior) -> (Controller, Arc<MemoryBackend>, Arc<PodExecutor>) {
        let backend = Arc::new(MemoryBackend::with_default(behavior));
        let executor = Arc::new(PodExecutor::with_config(
            backend.clone(),
            ExecutorConfig {
                poll_interval: poll,
            },
        ));
        (Controller::new(executor.clone()), backend, executor)
    }

    async fn wait_for(
        controller: &Controller,
        name: &str,
        within: Duration,
        condition: impl Fn(&HealthCheck) -> bool,
    ) -> HealthCheck {
        let deadline = Instant::now() + within;
        loop {
            if let Some(check) = controller.get(name).await {
                if condition(&check) {
                    return check;
                }
            }
            assert!(Instant::now() < deadline, "condition on {name} not reached in {within:?}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn passing_unit_completes_within_one_interval() {
        let (controller, backend, _) =
            setup(Duration::from_millis(100), UnitBehavior::succeed().after_polls(9));
        controller
            .register(HealthCheck::new("c", "default", 5, 2))
            .await
            .unwrap();

        let check = wait_for(&controller, "c", Duration::from_secs(6), |c| {
            c.status.state == CheckState::Completed
        })
        .await;

        assert!(check.status.ok);
        assert_eq!(check.status.consecutive_failures, 0);
        assert!(check.status.errors.is_empty());
        assert!(check.status.last_success.is_some());
        assert!(check.status.current_check_uuid.is_none());
        assert_eq!(backend.deleted_units().len(), 1);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn hung_unit_fails_with_timeout_and_is_deleted() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::hang());
        let started = Instant::now();
        controller
            .register(HealthCheck::new("c", "default", 5, 2))
            .await
            .unwrap();

        let check = wait_for(&controller, "c", Duration::from_secs(4), |c| {
            c.status.state == CheckState::Failed
        })
        .await;

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(!check.status.ok);
        assert_eq!(check.status.errors, vec!["Check timed out after 2 seconds"]);
        assert_eq!(check.status.consecutive_failures, 1);
        assert_eq!(backend.deleted_units().len(), 1);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn run_now_is_single_flight() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::hang());
        controller
            .register(HealthCheck::new("c", "default", 3600, 30))
            .await
            .unwrap();

        let first = controller.run_now("c").await;
        let second = controller.run_now("c").await;
        assert!(!second.is_dispatched());
        assert!(second.await.is_none());

        let running = wait_for(&controller, "c", Duration::from_secs(2), |c| {
            c.status.current_check_uuid.is_some()
        })
        .await;
        assert_eq!(running.status.state, CheckState::Running);
        let uuid = running.status.current_check_uuid.unwrap();
        assert!(controller.cancel(&uuid));

        let check = wait_for(&controller, "c", Duration::from_secs(2), |c| {
            c.status.state == CheckState::Failed
        })
        .await;
        assert_eq!(check.status.errors, vec!["Check cancelled before completion"]);
        assert_eq!(backend.created_units().len(), 1);
        assert_eq!(backend.deleted_units().len(), 1);

        if first.is_dispatched() {
            let result = first.await.unwrap();
            assert_eq!(result.uuid, uuid);
            assert!(!result.ok);
        }
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn run_now_on_unknown_check_is_a_noop() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::succeed());

        let handle = controller.run_now("missing").await;
        assert!(!handle.is_dispatched());
        assert!(handle.await.is_none());
        assert_eq!(controller.check_count().await, 0);
        assert!(backend.created_units().is_empty());
        assert!(!controller.cancel(&Uuid::new_v4()));
    }

    #[tokio::test]
    async fn reregistering_replaces_schedule_but_keeps_slot() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::hang());
        controller
            .register(HealthCheck::new("c", "default", 3600, 30))
            .await
            .unwrap();
        wait_for(&controller, "c", Duration::from_secs(2), |c| c.status.is_running()).await;

        controller
            .register(HealthCheck::new("c", "default", 1800, 30))
            .await
            .unwrap();
        assert_eq!(controller.check_count().await, 1);
        assert_eq!(controller.active_schedules().await, 1);

        let check = controller.get("c").await.unwrap();
        assert_eq!(check.run_interval_seconds, 1800);
        assert_eq!(check.status.state, CheckState::New);

        // The first definition's execution still holds the slot.
        assert!(!controller.run_now("c").await.is_dispatched());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.created_units().len(), 1);

        controller.shutdown().await;
        assert!(backend.live_units().is_empty());
    }

    #[tokio::test]
    async fn unregister_then_register_waits_for_the_running_execution() {
        let (controller, backend, executor) = setup(Duration::from_millis(10), UnitBehavior::hang());
        controller
            .register(HealthCheck::new("c", "default", 3600, 30))
            .await
            .unwrap();
        while backend.created_units().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(controller.unregister("c").await);
        controller
            .register(HealthCheck::new("c", "default", 3600, 30))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(backend.created_units().len(), 1);
        assert_eq!(executor.in_flight_count(), 1);
        assert!(!controller.run_now("c").await.is_dispatched());

        controller.shutdown().await;
        assert!(backend.live_units().is_empty());
    }

    #[tokio::test]
    async fn reregistering_leaves_exactly_one_timer() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::succeed());
        controller
            .register(HealthCheck::new("c", "default", 1, 1))
            .await
            .unwrap();
        wait_for(&controller, "c", Duration::from_secs(2), |c| {
            c.status.state == CheckState::Completed
        })
        .await;

        controller
            .register(HealthCheck::new("c", "default", 1, 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // One run from the first definition, then the replacement timer's
        // immediate tick plus two more. A leaked timer would add two.
        let created = backend.created_units().len();
        assert!((3..=4).contains(&created), "created {created} units");
        assert_eq!(controller.active_schedules().await, 1);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn failures_accumulate_until_a_pass() {
        let (controller, backend, _) =
            setup(Duration::from_millis(10), UnitBehavior::fail("boom"));
        controller
            .register(HealthCheck::new("c", "default", 3600, 5))
            .await
            .unwrap();
        wait_for(&controller, "c", Duration::from_secs(2), |c| {
            c.status.state == CheckState::Failed
        })
        .await;

        for _ in 0..2 {
            let result = controller.run_now("c").await.await.unwrap();
            assert!(!result.ok);
        }
        let check = controller.get("c").await.unwrap();
        assert_eq!(check.status.consecutive_failures, 3);
        assert_eq!(
            check.status.errors,
            vec!["Check unit failed with phase: Failed", "Check unit logs: boom"]
        );

        backend.set_behavior("c", UnitBehavior::succeed());
        let result = controller.run_now("c").await.await.unwrap();
        assert!(result.ok);

        let check = controller.get("c").await.unwrap();
        assert_eq!(check.status.state, CheckState::Completed);
        assert_eq!(check.status.consecutive_failures, 0);
        assert!(check.status.errors.is_empty());
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_error_becomes_failing_status() {
        let (controller, _, executor) = setup(Duration::from_millis(10), UnitBehavior::succeed());
        executor.shutdown().await;
        controller
            .register(HealthCheck::new("c", "default", 3600, 5))
            .await
            .unwrap();

        let check = wait_for(&controller, "c", Duration::from_secs(2), |c| {
            c.status.consecutive_failures == 1
        })
        .await;
        assert_eq!(check.status.state, CheckState::Failed);
        assert_eq!(check.status.errors, vec!["Execution error: executor is shut down"]);
        assert!(check.status.current_check_uuid.is_none());

        let handle = controller.run_now("c").await;
        assert!(handle.is_dispatched());
        assert!(handle.await.is_none());
        assert_eq!(controller.get("c").await.unwrap().status.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn health_aggregates_over_all_checks() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::succeed());
        assert!(controller.is_healthy().await);
        assert_eq!(controller.failing_count().await, 0);

        backend.set_behavior("bad", UnitBehavior::fail(""));
        controller
            .register(HealthCheck::new("good", "default", 3600, 5))
            .await
            .unwrap();
        controller
            .register(HealthCheck::new("bad", "default", 3600, 5))
            .await
            .unwrap();
        wait_for(&controller, "good", Duration::from_secs(2), |c| c.status.ok).await;
        wait_for(&controller, "bad", Duration::from_secs(2), |c| {
            c.status.state == CheckState::Failed
        })
        .await;

        assert!(!controller.is_healthy().await);
        assert_eq!(controller.failing_count().await, 1);

        controller.unregister("bad").await;
        assert!(controller.is_healthy().await);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn schedule_fires_at_a_fixed_rate() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::succeed());
        controller
            .register(HealthCheck::new("c", "default", 1, 1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(backend.created_units().len() >= 2);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn unregister_and_list() {
        let (controller, _, _) = setup(Duration::from_millis(10), UnitBehavior::succeed());
        for name in ["zeta", "alpha"] {
            controller
                .register(HealthCheck::new(name, "default", 3600, 5))
                .await
                .unwrap();
        }

        let names: Vec<String> = controller.list().await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        assert!(controller.unregister("alpha").await);
        assert!(!controller.unregister("alpha").await);
        assert_eq!(controller.check_count().await, 1);
        assert_eq!(controller.active_schedules().await, 1);
        assert!(controller.get("alpha").await.is_none());
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_definition_is_rejected() {
        let (controller, _, _) = setup(Duration::from_millis(10), UnitBehavior::succeed());
        let err = controller
            .register(HealthCheck::new("", "default", 60, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidCheck(_)));

        let err = controller
            .register(HealthCheck::new("c", "default", 0, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidCheck(_)));
        assert_eq!(controller.check_count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_stops_schedules_and_refuses_registration() {
        let (controller, _, _) = setup(Duration::from_millis(10), UnitBehavior::succeed());
        controller
            .register(HealthCheck::new("c", "default", 3600, 5))
            .await
            .unwrap();

        controller.shutdown().await;
        assert_eq!(controller.active_schedules().await, 0);
        assert!(controller.get("c").await.is_some());

        let err = controller
            .register(HealthCheck::new("d", "default", 60, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::ShutDown));
    }

    #[tokio::test]
    async fn run_now_after_shutdown_is_skipped() {
        let (controller, backend, _) = setup(Duration::from_millis(10), UnitBehavior::fail(""));
        controller
            .register(HealthCheck::new("c", "default", 3600, 5))
            .await
            .unwrap();
        wait_for(&controller, "c", Duration::from_secs(2), |c| {
            c.status.state == CheckState::Failed
        })
        .await;
        controller.shutdown().await;

        let handle = controller.run_now("c").await;
        assert!(!handle.is_dispatched());
        assert!(handle.await.is_none());

        let check = controller.get("c").await.unwrap();
        assert_eq!(check.status.state, CheckState::Failed);
        assert_eq!(check.status.consecutive_failures, 1);
        assert!(check.status.current_check_uuid.is_none());
        assert_eq!(backend.created_units().len(), 1);
    }
}
