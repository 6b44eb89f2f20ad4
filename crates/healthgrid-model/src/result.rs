//! Outcome of one execution attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The result of exactly one execution of a check.
///
/// Built by the executor while the attempt runs and handed to the
/// controller once finalized. Starts out failing; the executor flips
/// `ok` only on a terminal success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub check_name: String,
    /// Execution id, distinct from the check's identity.
    pub uuid: Uuid,
    pub ok: bool,
    pub errors: Vec<String>,
    #[serde(rename = "runDuration")]
    pub run_duration_millis: u64,
    /// Creation time of the attempt.
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    /// A failing, error-free result for `check_name`, stamped now.
    pub fn new(check_name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            check_name: check_name.into(),
            uuid,
            ok: false,
            errors: Vec::new(),
            run_duration_millis: 0,
            timestamp: Utc::now(),
        }
    }

    /// Mark the attempt as passed.
    pub fn pass(&mut self) {
        self.ok = true;
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}
