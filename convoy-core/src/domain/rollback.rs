//! Rollback policy types

use serde::{Deserialize, Serialize};

/// Whether and when a failed run rolls back automatically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackStrategy {
    pub automatic: bool,
    pub triggers: Vec<RollbackTrigger>,
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for RollbackStrategy {
    fn default() -> Self {
        Self {
            automatic: false,
            triggers: Vec::new(),
            max_attempts: 1,
            timeout_secs: 300,
        }
    }
}

/// A condition that arms automatic rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackTrigger {
    pub kind: RollbackTriggerKind,
    /// Threshold the observed signal is compared against; meaning depends
    /// on the kind (failure ratio, milliseconds, ...)
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackTriggerKind {
    ErrorRate,
    ResponseTime,
    HealthCheck,
    Manual,
}
