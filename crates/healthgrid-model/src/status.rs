//! Per-check status state machine.
//!
//! ```text
//! NEW ──trigger──▶ RUNNING ──ok──────▶ COMPLETED
//!                     │
//!                     ├──not ok──────▶ FAILED
//!                     └──dispatch err▶ FAILED
//! ```
//!
//! Every completion overwrites `errors`. Only `consecutive_failures`
//! accumulates across attempts, and a single pass resets it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::result::CheckResult;

/// Lifecycle state of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckState {
    #[default]
    New,
    Running,
    Completed,
    Failed,
    /// Reserved. Timeouts are reported as `Failed` with a timeout error.
    Timeout,
}

/// Accumulated status of one check.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckStatus {
    pub state: CheckState,
    /// Last known pass/fail, independent of `state`.
    pub ok: bool,
    /// Diagnostics from the latest non-passing outcome.
    pub errors: Vec<String>,
    #[serde(with = "crate::timestamp::option")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(with = "crate::timestamp::option")]
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    #[serde(rename = "currentCheckUUID")]
    pub current_check_uuid: Option<Uuid>,
}

impl HealthCheckStatus {
    /// Enter `RUNNING`. `last_run` records the attempt start.
    pub fn begin_run(&mut self, at: DateTime<Utc>) {
        self.state = CheckState::Running;
        self.last_run = Some(at);
    }

    /// Record which execution is in flight.
    pub fn attach_execution(&mut self, uuid: Uuid) {
        self.current_check_uuid = Some(uuid);
    }

    /// Fold an executor result into the status.
    pub fn record_result(&mut self, result: &CheckResult, at: DateTime<Utc>) {
        self.current_check_uuid = None;
        if result.ok {
            if self.consecutive_failures > 0 {
                debug!(
                    check = %result.check_name,
                    failures = self.consecutive_failures,
                    "check recovered"
                );
            }
            self.state = CheckState::Completed;
            self.ok = true;
            self.last_success = Some(at);
            self.consecutive_failures = 0;
            self.errors.clear();
        } else {
            self.state = CheckState::Failed;
            self.ok = false;
            self.errors = result.errors.clone();
            self.consecutive_failures += 1;
            warn!(
                check = %result.check_name,
                failures = self.consecutive_failures,
                errors = ?result.errors,
                "check failed"
            );
        }
    }

    /// Fold a dispatch-level fault (no result was produced).
    pub fn record_dispatch_error(&mut self, message: &str) {
        self.current_check_uuid = None;
        self.state = CheckState::Failed;
        self.ok = false;
        self.errors = vec![format!("Execution error: {message}")];
        self.consecutive_failures += 1;
    }

    /// Whether an execution is currently attached.
    pub fn is_running(&self) -> bool {
        self.state == CheckState::Running
    }
}
