//! Executor error types.

use std::any::Any;

use thiserror::Error;

/// Errors returned by a [`WorkloadBackend`](crate::WorkloadBackend).
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("unit not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Wrap a client error raised by `operation`.
    pub fn api(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Api {
            operation,
            message: err.to_string(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Dispatch-level failures of an [`ExecutionHandle`](crate::ExecutionHandle).
///
/// These mean no result was produced at all. Backend problems and panics
/// during the run are reported inside the `CheckResult` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("executor is shut down")]
    ShutDown,

    #[error("execution task was interrupted")]
    Interrupted,

    #[error("execution task panicked: {0}")]
    Panicked(String),
}

impl From<tokio::task::JoinError> for ExecuteError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::Panicked(panic_message(err.into_panic().as_ref()))
        } else {
            Self::Interrupted
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
