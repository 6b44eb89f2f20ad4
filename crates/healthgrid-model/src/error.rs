//! Error types for check definitions.

use thiserror::Error;

/// Reasons a [`HealthCheck`](crate::HealthCheck) definition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("check name must not be empty")]
    EmptyName,

    #[error("check {0}: namespace must not be empty")]
    EmptyNamespace(String),

    #[error("check {0}: run interval must be at least one second")]
    ZeroInterval(String),

    #[error("check {0}: timeout must be at least one second")]
    ZeroTimeout(String),

    #[error("check {0}: workload image must not be empty")]
    EmptyImage(String),
}
