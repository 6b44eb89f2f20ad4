//! healthgrid-executor — runs health checks, one result per execution.
//!
//! The executor turns a [`HealthCheck`](healthgrid_model::HealthCheck)
//! into exactly one [`CheckResult`](healthgrid_model::CheckResult) by
//! driving a [`WorkloadBackend`] through its lifecycle:
//!
//! ```text
//! PodExecutor::execute()
//!   └── spawned task (per execution UUID)
//!       ├── create_unit()
//!       ├── read_phase() every poll_interval ── until Succeeded/Failed,
//!       │                                       timeout, poll error,
//!       │                                       or cancel(uuid)
//!       ├── read_logs()   (only on Failed, best effort)
//!       └── delete_unit() (exactly once, drop guard as backstop)
//! ```
//!
//! Backend failures never escape: they become error strings on the
//! result, and so does a panic inside the execution ("Execution error:
//! ..."). The [`ExecutionHandle`] only resolves to an error when the
//! executor was shut down or the task was torn down from outside.
//!
//! [`NetworkExecutor`] is the lighter alternative: it resolves a cluster
//! service name in process and never creates a workload.
//!
//! Two backends ship with the crate: [`KubeBackend`] creates pods through
//! the Kubernetes API, and [`MemoryBackend`] scripts unit behaviour in
//! process for tests and dry runs.

pub mod backend;
pub mod error;
pub mod handle;
pub mod inflight;
pub mod k8s;
pub mod memory;
pub mod network;
pub mod pod;

mod dispatch;

use async_trait::async_trait;
use healthgrid_model::HealthCheck;
use uuid::Uuid;

pub use backend::{UnitPhase, UnitSpec, WorkloadBackend};
pub use error::{BackendError, BackendResult, ExecuteError};
pub use handle::ExecutionHandle;
pub use k8s::KubeBackend;
pub use memory::{CALL_LOG_CAPACITY, MemoryBackend, UnitBehavior, UnitOutcome};
pub use network::NetworkExecutor;
pub use pod::{ExecutorConfig, PodExecutor};

/// Runs checks asynchronously, one result per call.
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    /// Dispatch one execution and return immediately.
    ///
    /// Callers must not dispatch the same check name again while an
    /// earlier handle is pending; the controller enforces this.
    fn execute(&self, check: &HealthCheck) -> ExecutionHandle;

    /// Cancel the in-flight execution with this UUID. Returns `false` if
    /// no such execution is running.
    fn cancel(&self, uuid: &Uuid) -> bool;

    /// Whether an execution for `check_name` is dispatched and pending.
    fn is_running(&self, check_name: &str) -> bool;

    /// Stop accepting work, cancel in-flight executions and wait for
    /// their cleanup to finish.
    async fn shutdown(&self);
}
