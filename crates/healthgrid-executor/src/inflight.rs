//! Bookkeeping for executions that have been dispatched and not finished.
//!
//! Entries are keyed by execution UUID so cancellation hits exactly the
//! requested execution. An [`InFlightGuard`] owned by the execution task
//! removes its entry when dropped, which covers normal completion,
//! panics and task teardown alike.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
struct Entry {
    check_name: String,
    token: CancellationToken,
}

/// Shared map of in-flight executions.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `uuid` until the returned guard is dropped.
    pub fn register(&self, uuid: Uuid, check_name: &str, token: CancellationToken) -> InFlightGuard {
        self.lock().insert(
            uuid,
            Entry {
                check_name: check_name.to_string(),
                token,
            },
        );
        InFlightGuard {
            entries: self.entries.clone(),
            uuid,
        }
    }

    /// Trigger the cancellation token of `uuid`. `false` if not in flight.
    ///
    /// The entry stays until the execution finishes its cleanup.
    pub fn cancel(&self, uuid: &Uuid) -> bool {
        match self.lock().get(uuid) {
            Some(entry) => {
                entry.token.cancel();
                info!(check = %entry.check_name, %uuid, "execution cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, check_name: &str) -> bool {
        self.lock().values().any(|e| e.check_name == check_name)
    }

    /// UUIDs currently in flight for `check_name`.
    pub fn executions_for(&self, check_name: &str) -> Vec<Uuid> {
        self.lock()
            .iter()
            .filter(|(_, e)| e.check_name == check_name)
            .map(|(uuid, _)| *uuid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its execution from [`InFlight`] on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
    uuid: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(&self.uuid);
    }
}
