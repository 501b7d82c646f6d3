//! Action execution seam
//!
//! Concrete tooling (script runners, image builders, cluster deployers,
//! test harnesses) lives outside the engine. The stage executor drives it
//! through this capability interface and is agnostic to what an action
//! type actually does.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use convoy_core::domain::artifact::Artifact;
use convoy_core::domain::log::LogEntry;
use convoy_core::domain::stage::{ErrorClass, StageAction};

/// Context handed to an executor alongside the action configuration
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_name: String,
    pub environment: Option<String>,
    pub variables: HashMap<String, serde_json::Value>,
}

/// What one successful action execution produced
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub artifacts: Vec<Artifact>,
    pub logs: Vec<LogEntry>,
    /// Named samples (coverage, latency, ...) folded into run metrics
    pub metrics: HashMap<String, f64>,
}

/// A failed action execution, classified for retry gating
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
    pub class: ErrorClass,
}

impl ActionError {
    pub fn new(message: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            message: message.into(),
            class,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message, ErrorClass::Timeout)
    }
}

/// Capability interface implemented by action executors
///
/// The engine dispatches on the closed [`convoy_core::domain::stage::ActionKind`]
/// enum; an implementation matches on it exhaustively and performs the
/// actual work.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Executes one action
    ///
    /// # Arguments
    /// * `action` - The action and its typed configuration
    /// * `ctx` - Run/stage identity, target environment and trigger variables
    ///
    /// # Returns
    /// Artifacts, logs and metric samples on success; a classified error
    /// on failure.
    async fn execute(
        &self,
        action: &StageAction,
        ctx: &ActionContext,
    ) -> std::result::Result<ActionOutcome, ActionError>;
}
