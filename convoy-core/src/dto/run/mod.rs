//! Run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{PipelineRun, RunStatus, TriggerKind};

/// Lightweight run summary for listing and status displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: RunStatus,
    pub trigger_kind: TriggerKind,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub stage_count: usize,
    pub rolled_back: bool,
}

impl From<PipelineRun> for RunSummary {
    fn from(run: PipelineRun) -> Self {
        Self {
            id: run.id,
            pipeline_id: run.pipeline_id,
            status: run.status,
            trigger_kind: run.trigger.kind,
            started_at: run.started_at,
            completed_at: run.completed_at,
            stage_count: run.stage_runs.len(),
            rolled_back: run.rollback.is_some(),
        }
    }
}

/// One approver's decision submitted against a waiting stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitApproval {
    pub run_id: Uuid,
    pub stage_id: Uuid,
    pub approver: String,
    pub approved: bool,
    pub comment: Option<String>,
}
