//! Pod lifecycle driver.
//!
//! One spawned task per execution: create the unit, wait for a terminal
//! phase under the check's timeout, collect logs on failure, delete the
//! unit. The wait is also cut short by the execution's cancellation
//! token, and cleanup runs on that path too.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use healthgrid_model::{CheckResult, HealthCheck};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::CheckExecutor;
use crate::backend::{UnitPhase, UnitSpec, WorkloadBackend};
use crate::dispatch::Dispatcher;
use crate::error::BackendError;
use crate::handle::ExecutionHandle;

/// Tunables for [`PodExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Delay between phase reads.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Runs each check as an ephemeral unit on a [`WorkloadBackend`].
pub struct PodExecutor {
    backend: Arc<dyn WorkloadBackend>,
    config: ExecutorConfig,
    dispatcher: Dispatcher,
}

impl PodExecutor {
    pub fn new(backend: Arc<dyn WorkloadBackend>) -> Self {
        Self::with_config(backend, ExecutorConfig::default())
    }

    pub fn with_config(backend: Arc<dyn WorkloadBackend>, config: ExecutorConfig) -> Self {
        Self {
            backend,
            config,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Number of executions dispatched and not yet finished.
    pub fn in_flight_count(&self) -> usize {
        self.dispatcher.in_flight_count()
    }
}

#[async_trait]
impl CheckExecutor for PodExecutor {
    fn execute(&self, check: &HealthCheck) -> ExecutionHandle {
        let backend = self.backend.clone();
        let poll_interval = self.config.poll_interval;
        let owned = check.clone();
        self.dispatcher.spawn(check, move |uuid, token| {
            PodRun {
                backend,
                check: owned,
                uuid,
                poll_interval,
                token,
            }
            .execute()
        })
    }

    fn cancel(&self, uuid: &Uuid) -> bool {
        self.dispatcher.cancel(uuid)
    }

    fn is_running(&self, check_name: &str) -> bool {
        self.dispatcher.is_running(check_name)
    }

    async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

/// How the wait for a terminal phase ended.
#[derive(Debug)]
enum WaitOutcome {
    Terminal(UnitPhase),
    TimedOut,
    PollFailed(BackendError),
    Cancelled,
}

/// One execution attempt.
struct PodRun {
    backend: Arc<dyn WorkloadBackend>,
    check: HealthCheck,
    uuid: Uuid,
    poll_interval: Duration,
    token: CancellationToken,
}

impl PodRun {
    async fn execute(self) -> CheckResult {
        let started = Instant::now();
        let mut result = CheckResult::new(&self.check.name, self.uuid);
        let namespace = self.check.namespace.as_str();
        let spec = UnitSpec::for_check(&self.check, self.uuid);

        match self.backend.create_unit(namespace, &spec).await {
            Ok(()) => {
                info!(check = %self.check.name, unit = %spec.name, "created check unit");
                let cleanup = UnitCleanup::arm(self.backend.clone(), namespace, &spec.name);
                self.observe(&spec.name, &mut result).await;
                cleanup.run().await;
            }
            Err(e) => {
                error!(check = %self.check.name, error = %e, "failed to create check unit");
                result.add_error(format!("Backend error: {e}"));
            }
        }

        result.run_duration_millis = started.elapsed().as_millis() as u64;
        debug!(
            check = %self.check.name,
            uuid = %self.uuid,
            ok = result.ok,
            duration_ms = result.run_duration_millis,
            "health check finished"
        );
        result
    }

    /// Wait for the outcome and translate it into the result.
    async fn observe(&self, unit: &str, result: &mut CheckResult) {
        match self.wait_for_terminal(unit).await {
            WaitOutcome::Terminal(UnitPhase::Succeeded) => result.pass(),
            WaitOutcome::Terminal(phase) => {
                result.add_error(format!("Check unit failed with phase: {phase}"));
                match self.backend.read_logs(&self.check.namespace, unit).await {
                    Ok(logs) if !logs.trim().is_empty() => {
                        result.add_error(format!("Check unit logs: {}", logs.trim_end()));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%unit, error = %e, "failed to read check unit logs"),
                }
            }
            WaitOutcome::TimedOut => {
                warn!(check = %self.check.name, %unit, "check timed out");
                result.add_error(format!(
                    "Check timed out after {} seconds",
                    self.check.timeout_seconds
                ));
            }
            WaitOutcome::PollFailed(e) => {
                error!(check = %self.check.name, %unit, error = %e, "failed to poll check unit");
                result.add_error(format!("Backend error while polling check unit: {e}"));
            }
            WaitOutcome::Cancelled => {
                result.add_error("Check cancelled before completion");
            }
        }
    }

    /// Poll until a terminal phase, a poll error, the deadline, or cancel.
    async fn wait_for_terminal(&self, unit: &str) -> WaitOutcome {
        let deadline = Duration::from_secs(self.check.timeout_seconds);
        let poll = async {
            loop {
                match self.backend.read_phase(&self.check.namespace, unit).await {
                    Ok(phase) if phase.is_terminal() => return Ok(phase),
                    Ok(phase) => debug!(%unit, %phase, "check unit not finished"),
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::select! {
            _ = self.token.cancelled() => WaitOutcome::Cancelled,
            outcome = tokio::time::timeout(deadline, poll) => match outcome {
                Ok(Ok(phase)) => WaitOutcome::Terminal(phase),
                Ok(Err(e)) => WaitOutcome::PollFailed(e),
                Err(_) => WaitOutcome::TimedOut,
            },
        }
    }
}

/// Deletes a created unit exactly once.
///
/// `run` performs the delete inline. If the execution task is torn down
/// before reaching it, `Drop` spawns the delete instead.
struct UnitCleanup {
    backend: Arc<dyn WorkloadBackend>,
    namespace: String,
    name: String,
    armed: bool,
}

impl UnitCleanup {
    fn arm(backend: Arc<dyn WorkloadBackend>, namespace: &str, name: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    async fn run(mut self) {
        self.armed = false;
        delete_unit(self.backend.clone(), &self.namespace, &self.name).await;
    }
}

impl Drop for UnitCleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let backend = self.backend.clone();
        let namespace = std::mem::take(&mut self.namespace);
        let name = std::mem::take(&mut self.name);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { delete_unit(backend, &namespace, &name).await });
        } else {
            error!(unit = %name, "no runtime available, check unit leaked");
        }
    }
}

async fn delete_unit(backend: Arc<dyn WorkloadBackend>, namespace: &str, name: &str) {
    match backend.delete_unit(namespace, name).await {
        Ok(()) => info!(%namespace, unit = %name, "deleted check unit"),
        Err(e) => error!(%namespace, unit = %name, error = %e, "failed to delete check unit"),
    }
}
