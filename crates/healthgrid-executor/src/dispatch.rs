//! Task plumbing shared by the executors.
//!
//! A [`Dispatcher`] owns the in-flight map, the task tracker and the
//! shutdown token. Every execution gets a child token, an in-flight
//! entry registered before its task is spawned, and a panic boundary
//! that turns an unwinding execution into a failing result.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use healthgrid_model::{CheckResult, HealthCheck};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ExecuteError, panic_message};
use crate::handle::ExecutionHandle;
use crate::inflight::InFlight;

#[derive(Debug, Default)]
pub(crate) struct Dispatcher {
    in_flight: InFlight,
    tasks: TaskTracker,
    /// Parent of every execution token; cancelled on shutdown.
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawn `run` for one execution of `check`.
    ///
    /// `run` receives the execution UUID and its cancellation token.
    pub(crate) fn spawn<F, Fut>(&self, check: &HealthCheck, run: F) -> ExecutionHandle
    where
        F: FnOnce(Uuid, CancellationToken) -> Fut,
        Fut: Future<Output = CheckResult> + Send + 'static,
    {
        let uuid = Uuid::new_v4();
        if self.shutdown.is_cancelled() {
            warn!(check = %check.name, "executor shut down, rejecting execution");
            return ExecutionHandle::rejected(uuid, &check.name, ExecuteError::ShutDown);
        }

        info!(check = %check.name, %uuid, "starting health check");
        let token = self.shutdown.child_token();
        let guard = self.in_flight.register(uuid, &check.name, token.clone());
        let execution = run(uuid, token);
        let name = check.name.clone();

        let join = self.tasks.spawn(async move {
            let _guard = guard;
            let started = Instant::now();
            match AssertUnwindSafe(execution).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(check = %name, %uuid, panic = %message, "health check panicked");
                    let mut result = CheckResult::new(&name, uuid);
                    result.add_error(format!("Execution error: {message}"));
                    result.run_duration_millis = started.elapsed().as_millis() as u64;
                    result
                }
            }
        });
        ExecutionHandle::spawned(uuid, &check.name, join)
    }

    pub(crate) fn cancel(&self, uuid: &Uuid) -> bool {
        self.in_flight.cancel(uuid)
    }

    pub(crate) fn is_running(&self, check_name: &str) -> bool {
        self.in_flight.is_running(check_name)
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Reject new work, cancel in-flight executions and wait for them.
    pub(crate) async fn shutdown(&self) {
        info!(in_flight = self.in_flight.len(), "shutting down executor");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("executor stopped");
    }
}
