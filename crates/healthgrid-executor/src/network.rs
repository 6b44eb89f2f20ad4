//! In-process network check.
//!
//! Resolves a cluster service name from the daemon itself instead of
//! scheduling a workload. A check passes when the name resolves to at
//! least one address within the check's timeout.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use healthgrid_model::{CheckResult, HealthCheck};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::CheckExecutor;
use crate::dispatch::Dispatcher;
use crate::handle::ExecutionHandle;

/// Resolved when no other target is configured.
pub const DEFAULT_TARGET: &str = "kubernetes.default.svc.cluster.local:443";

/// Runs each check as a DNS lookup of a fixed `host:port` target.
pub struct NetworkExecutor {
    target: String,
    dispatcher: Dispatcher,
}

impl NetworkExecutor {
    pub fn new() -> Self {
        Self::with_target(DEFAULT_TARGET)
    }

    /// `target` must be `host:port`.
    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of executions dispatched and not yet finished.
    pub fn in_flight_count(&self) -> usize {
        self.dispatcher.in_flight_count()
    }
}

impl Default for NetworkExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckExecutor for NetworkExecutor {
    fn execute(&self, check: &HealthCheck) -> ExecutionHandle {
        let target = self.target.clone();
        let owned = check.clone();
        self.dispatcher
            .spawn(check, move |uuid, token| resolve(owned, target, uuid, token))
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

async fn resolve(
    check: HealthCheck,
    target: String,
    uuid: Uuid,
    token: CancellationToken,
) -> CheckResult {
    let started = Instant::now();
    let mut result = CheckResult::new(&check.name, uuid);
    let deadline = Duration::from_secs(check.timeout_seconds);

    tokio::select! {
        _ = token.cancelled() => result.add_error("Check cancelled before completion"),
        lookup = tokio::time::timeout(deadline, tokio::net::lookup_host(target.as_str())) => {
            match lookup {
                Ok(Ok(mut addrs)) => match addrs.next() {
                    Some(addr) => {
                        info!(check = %check.name, service = %target, %addr, "network check resolved");
                        result.pass();
                    }
                    None => {
                        result.add_error(format!("Network check failed: no addresses for {target}"));
                    }
                },
                Ok(Err(e)) => {
                    warn!(check = %check.name, service = %target, error = %e, "network check failed");
                    result.add_error(format!("Network check failed: {e}"));
                }
                Err(_) => {
                    warn!(check = %check.name, service = %target, "network check timed out");
                    result.add_error(format!(
                        "Check timed out after {} seconds",
                        check.timeout_seconds
                    ));
                }
            }
        }
    }

    result.run_duration_millis = started.elapsed().as_millis() as u64;
    debug!(
        check = %check.name,
        %uuid,
        ok = result.ok,
        duration_ms = result.run_duration_millis,
        "health check finished"
    );
    result
}
