//! Controller error types.

use healthgrid_model::ValidationError;
use thiserror::Error;

/// Errors returned by [`Controller`](crate::Controller) operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid check definition: {0}")]
    InvalidCheck(#[from] ValidationError),

    #[error("controller is shut down")]
    ShutDown,
}

pub type ControllerResult<T> = Result<T, ControllerError>;
