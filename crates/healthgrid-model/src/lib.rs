//! healthgrid-model — shared data model for healthgrid.
//!
//! Holds the three records that flow through the engine:
//!
//! ```text
//! HealthCheck ──1:1── HealthCheckStatus   (accumulated state machine)
//!      │
//!      └──1:N── CheckResult               (one per execution attempt, transient)
//! ```
//!
//! All types serialize to the camelCase JSON shape served by the HTTP
//! surface. Status transitions live on [`HealthCheckStatus`] so the
//! controller only has to decide *when* to apply them.

pub mod error;
pub mod result;
pub mod status;
pub mod timestamp;
pub mod types;

pub use error::ValidationError;
pub use result::CheckResult;
pub use status::{CheckState, HealthCheckStatus};
pub use types::{HealthCheck, WorkloadSpec};
