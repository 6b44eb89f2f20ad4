//! In-process scripted backend.
//!
//! Units behave according to a [`UnitBehavior`] looked up by check name
//! (from the `check-name` label), falling back to a default behaviour.
//! Creates and deletes are recorded so tests can assert on them. The
//! call logs keep the most recent [`CALL_LOG_CAPACITY`] entries, so a
//! long-running daemon on this backend stays bounded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::backend::{UnitPhase, UnitSpec, WorkloadBackend};
use crate::error::{BackendError, BackendResult};

/// Entries kept in each of the create and delete logs.
pub const CALL_LOG_CAPACITY: usize = 1024;

/// Terminal outcome of a scripted unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Succeed,
    Fail,
    /// Never reaches a terminal phase.
    Hang,
}

/// How a scripted unit behaves.
#[derive(Debug, Clone)]
pub struct UnitBehavior {
    pub outcome: UnitOutcome,
    /// Polls answered with `Running` before the outcome shows.
    pub running_polls: u32,
    /// `None` makes `read_logs` fail.
    pub logs: Option<String>,
    pub create_error: Option<String>,
    pub poll_error: Option<String>,
    pub delete_error: Option<String>,
}

impl UnitBehavior {
    fn with_outcome(outcome: UnitOutcome) -> Self {
        Self {
            outcome,
            running_polls: 0,
            logs: Some(String::new()),
            create_error: None,
            poll_error: None,
            delete_error: None,
        }
    }

    pub fn succeed() -> Self {
        Self::with_outcome(UnitOutcome::Succeed)
    }

    pub fn fail(logs: impl Into<String>) -> Self {
        Self {
            logs: Some(logs.into()),
            ..Self::with_outcome(UnitOutcome::Fail)
        }
    }

    pub fn hang() -> Self {
        Self::with_outcome(UnitOutcome::Hang)
    }

    pub fn after_polls(mut self, polls: u32) -> Self {
        self.running_polls = polls;
        self
    }

    pub fn without_logs(mut self) -> Self {
        self.logs = None;
        self
    }

    pub fn with_create_error(mut self, message: impl Into<String>) -> Self {
        self.create_error = Some(message.into());
        self
    }

    pub fn with_poll_error(mut self, message: impl Into<String>) -> Self {
        self.poll_error = Some(message.into());
        self
    }

    pub fn with_delete_error(mut self, message: impl Into<String>) -> Self {
        self.delete_error = Some(message.into());
        self
    }
}

impl Default for UnitBehavior {
    fn default() -> Self {
        Self::succeed()
    }
}

#[derive(Debug)]
struct Unit {
    namespace: String,
    behavior: UnitBehavior,
    polls: u32,
}

#[derive(Debug, Default)]
struct State {
    default: UnitBehavior,
    behaviors: HashMap<String, UnitBehavior>,
    units: HashMap<String, Unit>,
    created: VecDeque<UnitSpec>,
    deleted: VecDeque<String>,
}

fn record<T>(log: &mut VecDeque<T>, entry: T) {
    if log.len() == CALL_LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(entry);
}

/// Scripted [`WorkloadBackend`] living entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// Every unit succeeds on its first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `behavior` for checks without their own script.
    pub fn with_default(behavior: UnitBehavior) -> Self {
        let backend = Self::default();
        backend.lock().default = behavior;
        backend
    }

    /// Script the units of `check_name`. Applies to units created later.
    pub fn set_behavior(&self, check_name: &str, behavior: UnitBehavior) {
        self.lock()
            .behaviors
            .insert(check_name.to_string(), behavior);
    }

    /// Specs of recently created units, oldest first.
    pub fn created_units(&self) -> Vec<UnitSpec> {
        self.lock().created.iter().cloned().collect()
    }

    /// Names recently passed to `delete_unit`, oldest first, including
    /// failed deletes.
    pub fn deleted_units(&self) -> Vec<String> {
        self.lock().deleted.iter().cloned().collect()
    }

    /// How many times `delete_unit` was called for `name`.
    pub fn delete_calls(&self, name: &str) -> usize {
        self.lock().deleted.iter().filter(|n| *n == name).count()
    }

    /// Units created and not yet deleted.
    pub fn live_units(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().units.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge the other assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(namespace: &str, name: &str) -> BackendError {
    BackendError::NotFound {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl WorkloadBackend for MemoryBackend {
    async fn create_unit(&self, namespace: &str, spec: &UnitSpec) -> BackendResult<()> {
        let mut state = self.lock();
        let behavior = spec
            .check_name()
            .and_then(|name| state.behaviors.get(name))
            .cloned()
            .unwrap_or_else(|| state.default.clone());

        if let Some(message) = &behavior.create_error {
            return Err(BackendError::api("create unit", message));
        }
        record(&mut state.created, spec.clone());
        state.units.insert(
            spec.name.clone(),
            Unit {
                namespace: namespace.to_string(),
                behavior,
                polls: 0,
            },
        );
        Ok(())
    }

    async fn read_phase(&self, namespace: &str, name: &str) -> BackendResult<UnitPhase> {
        let mut state = self.lock();
        let unit = state
            .units
            .get_mut(name)
            .filter(|u| u.namespace == namespace)
            .ok_or_else(|| not_found(namespace, name))?;

        if let Some(message) = &unit.behavior.poll_error {
            return Err(BackendError::api("read unit phase", message));
        }
        unit.polls += 1;
        if unit.polls <= unit.behavior.running_polls {
            return Ok(UnitPhase::Running);
        }
        Ok(match unit.behavior.outcome {
            UnitOutcome::Succeed => UnitPhase::Succeeded,
            UnitOutcome::Fail => UnitPhase::Failed,
            UnitOutcome::Hang => UnitPhase::Running,
        })
    }

    async fn read_logs(&self, namespace: &str, name: &str) -> BackendResult<String> {
        let state = self.lock();
        let unit = state
            .units
            .get(name)
            .filter(|u| u.namespace == namespace)
            .ok_or_else(|| not_found(namespace, name))?;
        unit.behavior
            .logs
            .clone()
            .ok_or_else(|| BackendError::api("read unit logs", "log stream unavailable"))
    }

    async fn delete_unit(&self, namespace: &str, name: &str) -> BackendResult<()> {
        let mut state = self.lock();
        record(&mut state.deleted, name.to_string());
        let Some(unit) = state.units.get(name) else {
            return Err(not_found(namespace, name));
        };
        if let Some(message) = unit.behavior.delete_error.clone() {
            return Err(BackendError::api("delete unit", message));
        }
        state.units.remove(name);
        Ok(())
    }
}
