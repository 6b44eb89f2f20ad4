//! Per-check single-flight reservation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// At most one execution per check name holds this slot.
#[derive(Debug, Default)]
pub struct ExecutionSlot {
    busy: AtomicBool,
}

impl ExecutionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the slot. `None` if an execution already holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotPermit { slot: self.clone() })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the slot on drop.
#[derive(Debug)]
pub struct SlotPermit {
    slot: Arc<ExecutionSlot>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}
