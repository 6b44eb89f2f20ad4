//! The asynchronous handle returned by `execute`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use healthgrid_model::CheckResult;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ExecuteError;

enum Inner {
    Spawned(JoinHandle<CheckResult>),
    Rejected(Option<ExecuteError>),
}

/// A pending [`CheckResult`] for one execution.
///
/// Resolves to `Err` only for dispatch-level faults. Dropping the handle
/// does not stop the execution.
pub struct ExecutionHandle {
    uuid: Uuid,
    check_name: String,
    inner: Inner,
}

impl ExecutionHandle {
    pub(crate) fn spawned(uuid: Uuid, check_name: &str, join: JoinHandle<CheckResult>) -> Self {
        Self {
            uuid,
            check_name: check_name.to_string(),
            inner: Inner::Spawned(join),
        }
    }

    /// A handle that resolves immediately to `err`.
    pub fn rejected(uuid: Uuid, check_name: &str, err: ExecuteError) -> Self {
        Self {
            uuid,
            check_name: check_name.to_string(),
            inner: Inner::Rejected(Some(err)),
        }
    }

    /// Execution id; also the `check-uuid` label of the unit.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn check_name(&self) -> &str {
        &self.check_name
    }
}

impl Future for ExecutionHandle {
    type Output = Result<CheckResult, ExecuteError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Inner::Spawned(join) => Pin::new(join).poll(cx).map(|r| r.map_err(ExecuteError::from)),
            Inner::Rejected(err) => Poll::Ready(Err(err.take().unwrap_or(ExecuteError::ShutDown))),
        }
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("uuid", &self.uuid)
            .field("check_name", &self.check_name)
            .finish_non_exhaustive()
    }
}
