//! Pipeline control errors.

use crate::capture::{ConfigError, SensorError};
use thiserror::Error;

/// Errors returned by the pipeline control surface.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sensor error: {0}")]
    Device(#[from] SensorError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("pipeline is not running")]
    NotRunning,
    #[error("configuration cannot change while the pipeline is running")]
    ConfigWhileRunning,
    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("acquisition thread exited during startup")]
    StartupAborted,
}

impl PipelineError {
    /// True for misuse of the control surface rather than runtime failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PipelineError::AlreadyRunning
                | PipelineError::NotRunning
                | PipelineError::ConfigWhileRunning
        )
    }
}

/// Reports a control-surface precondition violation.
///
/// Debug builds fail fast with the error. Release builds log it and treat
/// the call as a no-op.
pub(crate) fn precondition_violation(error: PipelineError) -> Result<(), PipelineError> {
    tracing::warn!(%error, "Pipeline precondition violated");
    if cfg!(debug_assertions) {
        Err(error)
    } else {
        Ok(())
    }
}
