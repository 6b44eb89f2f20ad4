//! The execution unit backend seam.
//!
//! A backend can create a namespaced ephemeral unit from an image,
//! command and args, report its phase, return its logs and delete it.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use healthgrid_model::HealthCheck;
use uuid::Uuid;

use crate::error::BackendResult;

/// Kubernetes object names are capped at 63 characters.
const MAX_UNIT_NAME: usize = 63;
const UNIT_PREFIX: &str = "check-";
const UUID_PREFIX_LEN: usize = 8;

/// Label keys attached to every unit.
pub const LABEL_APP: &str = "app";
pub const LABEL_CHECK_NAME: &str = "check-name";
pub const LABEL_CHECK_UUID: &str = "check-uuid";
pub const APP_NAME: &str = "healthgrid";

/// Phase reported for an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl UnitPhase {
    /// Parse a phase string; anything unrecognised is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// No further transitions happen after a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Everything a backend needs to create one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
}

impl UnitSpec {
    /// Build the unit for one execution of `check`.
    pub fn for_check(check: &HealthCheck, uuid: Uuid) -> Self {
        let workload = check.workload();
        let labels = BTreeMap::from([
            (LABEL_APP.to_string(), APP_NAME.to_string()),
            (LABEL_CHECK_NAME.to_string(), check.name.clone()),
            (LABEL_CHECK_UUID.to_string(), uuid.to_string()),
        ]);
        Self {
            name: unit_name(&check.name, uuid),
            labels,
            image: workload.image,
            command: workload.command,
            args: workload.args,
        }
    }

    /// The check this unit was created for.
    pub fn check_name(&self) -> Option<&str> {
        self.labels.get(LABEL_CHECK_NAME).map(String::as_str)
    }
}

/// Deterministic unit name: `check-<name>-<first 8 uuid chars>`.
///
/// The name part is lower-cased, non `[a-z0-9-]` characters become `-`,
/// and it is truncated so the whole name fits 63 characters.
pub fn unit_name(check_name: &str, uuid: Uuid) -> String {
    let budget = MAX_UNIT_NAME - UNIT_PREFIX.len() - 1 - UUID_PREFIX_LEN;
    let sanitized: String = check_name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .take(budget)
        .collect();
    let sanitized = sanitized.trim_matches('-');
    let id = uuid.simple().to_string();
    format!("{UNIT_PREFIX}{sanitized}-{}", &id[..UUID_PREFIX_LEN])
}

/// A cluster control plane that runs ephemeral units.
#[async_trait]
pub trait WorkloadBackend: Send + Sync {
    /// Create the unit in `namespace`.
    async fn create_unit(&self, namespace: &str, spec: &UnitSpec) -> BackendResult<()>;

    /// Current phase of the unit.
    async fn read_phase(&self, namespace: &str, name: &str) -> BackendResult<UnitPhase>;

    /// Captured output of the unit.
    async fn read_logs(&self, namespace: &str, name: &str) -> BackendResult<String>;

    /// Remove the unit.
    async fn delete_unit(&self, namespace: &str, name: &str) -> BackendResult<()>;
}
