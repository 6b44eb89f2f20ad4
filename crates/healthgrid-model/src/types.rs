//! Check definitions.
//!
//! A [`HealthCheck`] is the registry entry: identity, schedule, the
//! workload to launch, and the live [`HealthCheckStatus`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::status::HealthCheckStatus;

/// Image launched when a check carries no workload spec.
pub const DEFAULT_IMAGE: &str = "busybox:latest";

/// Workload launched for one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkloadSpec {
    /// Trivial workload that always passes.
    pub fn always_pass() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo 'Health check passed'; exit 0".to_string(),
            ],
            args: Vec::new(),
        }
    }
}

/// A scheduled check definition plus its accumulated status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Unique key across the registry.
    pub name: String,
    /// Namespace the execution unit is created in.
    pub namespace: String,
    /// Fixed-rate period between runs, in seconds.
    #[serde(rename = "runInterval")]
    pub run_interval_seconds: u64,
    /// Wall-clock budget for one execution, in seconds.
    #[serde(rename = "timeout")]
    pub timeout_seconds: u64,
    /// `None` means the always-pass default workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_spec: Option<WorkloadSpec>,
    #[serde(default)]
    pub status: HealthCheckStatus,
}

impl HealthCheck {
    /// A new check with a fresh `NEW` status and the default workload.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        run_interval_seconds: u64,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            run_interval_seconds,
            timeout_seconds,
            pod_spec: None,
            status: HealthCheckStatus::default(),
        }
    }

    /// Attach a workload spec.
    pub fn with_workload(mut self, spec: WorkloadSpec) -> Self {
        self.pod_spec = Some(spec);
        self
    }

    /// The workload to launch, falling back to [`WorkloadSpec::always_pass`].
    pub fn workload(&self) -> WorkloadSpec {
        self.pod_spec.clone().unwrap_or_else(WorkloadSpec::always_pass)
    }

    /// Reject definitions the scheduler or executor cannot honor.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.namespace.trim().is_empty() {
            return Err(ValidationError::EmptyNamespace(self.name.clone()));
        }
        if self.run_interval_seconds == 0 {
            return Err(ValidationError::ZeroInterval(self.name.clone()));
        }
        if self.timeout_seconds == 0 {
            return Err(ValidationError::ZeroTimeout(self.name.clone()));
        }
        if let Some(spec) = &self.pod_spec {
            if spec.image.trim().is_empty() {
                return Err(ValidationError::EmptyImage(self.name.clone()));
            }
        }
        Ok(())
    }
}
