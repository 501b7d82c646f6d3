//! Error types for the Convoy engine

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine's directly-observable operations
///
/// Failures inside a run's asynchronous drive task never become errors:
/// they land in the run's status and log narrative instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Pipeline or stage configuration rejected
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Pipeline does not exist
    #[error("pipeline not found: {0}")]
    PipelineNotFound(Uuid),

    /// Run does not exist
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    /// Template does not exist
    #[error("template not found: {0}")]
    TemplateNotFound(Uuid),

    /// Structural operation refused because the pipeline has live runs
    #[error("conflict: {0}")]
    Conflict(String),

    /// No pending approval request for that approver/stage pair
    #[error("no pending approval for approver '{approver}' on stage {stage_id} of run {run_id}")]
    ApprovalNotFound {
        run_id: Uuid,
        stage_id: Uuid,
        approver: String,
    },

    /// Approval decided after the configured window closed
    #[error("approval window expired for stage '{stage}'")]
    ApprovalTimeout { stage: String },

    /// An action failed and retries are exhausted
    #[error("stage execution failed: {0}")]
    StageExecution(String),

    /// Failure during best-effort rollback
    #[error("rollback failed: {0}")]
    Rollback(String),
}

impl EngineError {
    /// Create a configuration error from any displayable cause
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PipelineNotFound(_) | Self::RunNotFound(_) | Self::TemplateNotFound(_)
        )
    }

    /// Check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
