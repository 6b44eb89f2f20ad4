//! healthgrid-controller — owns the check registry and drives schedules.
//!
//! ```text
//! Controller
//!   ├── registry: name → entry
//!   │     ├── HealthCheck (definition + status, behind a std Mutex)
//!   │     ├── ExecutionSlot (single-flight, survives re-registration)
//!   │     └── schedule task (tokio interval, first tick immediate)
//!   ├── CheckExecutor (dispatch, cancel, shutdown)
//!   └── completion tasks (fold result → status, then release the slot)
//! ```

pub mod controller;
pub mod error;
pub mod slot;

pub use controller::{Controller, RunHandle};
pub use error::{ControllerError, ControllerResult};
