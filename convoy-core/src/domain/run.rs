//! Run domain types
//!
//! A run is one execution instance of a pipeline; a stage run is the
//! execution record of one stage within it. Both accumulate logs,
//! artifacts and metrics so a dashboard can reconstruct the full
//! narrative without re-deriving state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::approval::ApprovalResult;
use crate::domain::artifact::Artifact;
use crate::domain::log::{LogEntry, LogLevel};
use crate::domain::stage::PipelineStage;

/// One execution instance of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub trigger: TriggerDescriptor,
    pub status: RunStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_secs: Option<i64>,
    pub stage_runs: Vec<StageRun>,
    pub artifacts: Vec<Artifact>,
    pub logs: Vec<LogEntry>,
    pub metrics: RunMetrics,
    pub rollback: Option<RollbackInfo>,
    /// Present while the run is suspended waiting for approval
    pub checkpoint: Option<RunCheckpoint>,
}

impl PipelineRun {
    /// Creates a fresh run in `Pending` for the given trigger
    pub fn new(pipeline_id: Uuid, trigger: TriggerDescriptor) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            trigger,
            status: RunStatus::Pending,
            started_at: chrono::Utc::now(),
            completed_at: None,
            duration_secs: None,
            stage_runs: Vec::new(),
            artifacts: Vec::new(),
            logs: Vec::new(),
            metrics: RunMetrics::default(),
            rollback: None,
            checkpoint: None,
        }
    }

    /// Finds the stage run for a stage by its name
    pub fn stage_run_by_name(&self, name: &str) -> Option<&StageRun> {
        self.stage_runs.iter().find(|sr| sr.stage_name == name)
    }

    /// Finds the stage run for a stage by its id
    pub fn stage_run_by_stage(&self, stage_id: Uuid) -> Option<&StageRun> {
        self.stage_runs.iter().find(|sr| sr.stage_id == stage_id)
    }

    /// Appends a timestamped log entry to the run narrative
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message, None));
    }

    /// Appends a log entry attributed to a stage
    pub fn log_stage(&mut self, level: LogLevel, stage: &str, message: impl Into<String>) {
        self.logs
            .push(LogEntry::new(level, message, Some(stage.to_string())));
    }
}

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    WaitingApproval,
}

impl RunStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// What started a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub kind: TriggerKind,
    pub actor: Option<String>,
    pub branch: Option<String>,
    pub variables: HashMap<String, serde_json::Value>,
}

impl TriggerDescriptor {
    pub fn manual(actor: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::Manual,
            actor: Some(actor.into()),
            branch: None,
            variables: HashMap::new(),
        }
    }

    /// String view of a trigger variable, if present
    pub fn variable_str(&self, key: &str) -> Option<String> {
        self.variables.get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Manual,
    Webhook,
    Schedule,
}

/// The execution record of one stage within one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRun {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub stage_name: String,
    pub status: StageRunStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attempts: u32,
    pub logs: Vec<LogEntry>,
    pub artifacts: Vec<Artifact>,
    pub metrics: HashMap<String, f64>,
    pub approvals: Vec<ApprovalResult>,
    pub error: Option<String>,
}

impl StageRun {
    pub fn new(stage: &PipelineStage) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage_id: stage.id,
            stage_name: stage.name.clone(),
            status: StageRunStatus::Running,
            started_at: chrono::Utc::now(),
            completed_at: None,
            attempts: 0,
            logs: Vec::new(),
            artifacts: Vec::new(),
            metrics: HashMap::new(),
            approvals: Vec::new(),
            error: None,
        }
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs
            .push(LogEntry::new(level, message, Some(self.stage_name.clone())));
    }

    /// Marks the stage run terminal with a completion stamp
    pub fn complete(&mut self, status: StageRunStatus) {
        self.status = status;
        self.completed_at = Some(chrono::Utc::now());
    }
}

/// Stage run status
///
/// Same vocabulary as [`RunStatus`] minus `Pending`: a stage run only
/// exists once its stage started executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageRunStatus {
    Running,
    Success,
    Failed,
    Cancelled,
    WaitingApproval,
}

/// Aggregate counters and observed samples for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Action executions attempted across all stages and attempts
    pub actions_total: u32,
    /// Action executions that failed
    pub actions_failed: u32,
    /// Named samples reported by action executors (coverage, latency, ...)
    pub observed: HashMap<String, f64>,
}

impl RunMetrics {
    /// Observed failure ratio; 0.0 until anything has executed
    pub fn failure_ratio(&self) -> f64 {
        if self.actions_total == 0 {
            0.0
        } else {
            f64::from(self.actions_failed) / f64::from(self.actions_total)
        }
    }
}

/// Record of an automatic or manual rollback attached to a failed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub reason: String,
    pub previous_version: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub succeeded: Option<bool>,
}

/// Serializable continuation of a suspended run
///
/// A run waiting for approval holds exactly the state the engine needs to
/// resume it: the stage index it suspended at and the suspension clock for
/// the approval timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub stage_index: usize,
    pub waiting_since: chrono::DateTime<chrono::Utc>,
    pub approval_timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stage::StageType;

    #[test]
    fn test_run_starts_pending() {
        let run = PipelineRun::new(Uuid::new_v4(), TriggerDescriptor::manual("dev"));
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.completed_at.is_none());
        assert!(run.checkpoint.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::WaitingApproval.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn test_failure_ratio() {
        let mut metrics = RunMetrics::default();
        assert_eq!(metrics.failure_ratio(), 0.0);
        metrics.actions_total = 10;
        metrics.actions_failed = 3;
        assert!((metrics.failure_ratio() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trigger_variable_str() {
        let mut trigger = TriggerDescriptor::manual("dev");
        trigger
            .variables
            .insert("version".to_string(), serde_json::json!("1.2.3"));
        trigger
            .variables
            .insert("replicas".to_string(), serde_json::json!(4));
        assert_eq!(trigger.variable_str("version").as_deref(), Some("1.2.3"));
        assert_eq!(trigger.variable_str("replicas").as_deref(), Some("4"));
        assert!(trigger.variable_str("missing").is_none());
    }

    #[test]
    fn test_stage_run_complete_stamps_time() {
        let stage = PipelineStage::new("deploy", StageType::Deploy, 3);
        let mut stage_run = StageRun::new(&stage);
        stage_run.complete(StageRunStatus::Success);
        assert_eq!(stage_run.status, StageRunStatus::Success);
        assert!(stage_run.completed_at.is_some());
    }
}
