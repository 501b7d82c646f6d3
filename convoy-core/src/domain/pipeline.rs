//! Pipeline domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::rollback::RollbackStrategy;
use crate::domain::stage::PipelineStage;

/// Pipeline definition
///
/// Structure shared between the registry (persists) and the engine (executes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub repository: String,
    pub branch: String,
    pub stages: Vec<PipelineStage>,
    pub trigger: TriggerConfig,
    pub environments: Vec<String>,
    pub config: PipelineConfig,
    pub status: PipelineStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Pipeline {
    /// Looks up a stage by name
    pub fn stage_by_name(&self, name: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the stages sorted by ascending order index
    pub fn ordered_stages(&self) -> Vec<&PipelineStage> {
        let mut stages: Vec<&PipelineStage> = self.stages.iter().collect();
        stages.sort_by_key(|s| s.order);
        stages
    }
}

/// Lifecycle status of a pipeline definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Active,
    Paused,
    Disabled,
    Draft,
}

/// How a pipeline is triggered
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerConfig {
    /// Allow manual triggering
    pub manual: bool,
    /// Branches that trigger on push (empty = any)
    pub on_push_branches: Vec<String>,
    /// Cron expression for scheduled triggering
    pub schedule: Option<String>,
}

/// Pipeline configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub notifications: Vec<NotificationRule>,
    pub deployment_strategy: DeploymentStrategy,
    pub rollback: RollbackStrategy,
    pub quality_gates: Vec<QualityGate>,
    /// Global timeout for a whole run, in seconds
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            notifications: Vec::new(),
            deployment_strategy: DeploymentStrategy::RollingUpdate,
            rollback: RollbackStrategy::default(),
            quality_gates: Vec::new(),
            timeout_secs: 3600,
        }
    }
}

/// Strategy used by deploy stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStrategy {
    Recreate,
    RollingUpdate,
    BlueGreen,
    Canary,
}

/// Run events a notification rule can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    Succeeded,
    Failed,
    Cancelled,
    WaitingApproval,
    RolledBack,
}

/// Routes run events to a notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub events: Vec<RunEvent>,
    pub channel: String,
    pub recipients: Vec<String>,
}

impl NotificationRule {
    pub fn matches(&self, event: RunEvent) -> bool {
        self.events.contains(&event)
    }
}

/// A policy threshold a run must meet before it may succeed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGate {
    pub name: String,
    /// Name of the observed run metric the gate checks
    pub metric: String,
    pub threshold: f64,
    pub comparison: GateComparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateComparison {
    AtLeast,
    AtMost,
}

impl QualityGate {
    /// True when the observed value satisfies the gate
    pub fn satisfied_by(&self, observed: f64) -> bool {
        match self.comparison {
            GateComparison::AtLeast => observed >= self.threshold,
            GateComparison::AtMost => observed <= self.threshold,
        }
    }
}
