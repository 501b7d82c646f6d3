//! Pipeline Registry
//!
//! CRUD store of pipeline definitions. All mutation flows through here so
//! every persisted pipeline satisfies the structural invariants the run
//! executor relies on: unique stage names, unique order values, strictly
//! backward dependencies and reachable approval quorums.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use convoy_core::domain::pipeline::{Pipeline, PipelineStatus};
use convoy_core::domain::stage::PipelineStage;
use convoy_core::dto::pipeline::{CreatePipeline, PipelineSummary};

use crate::error::{EngineError, Result};
use crate::repository::PipelineRepository;
use crate::state::ActiveRuns;

/// Pipeline definition service
#[derive(Clone)]
pub struct PipelineRegistry {
    pipelines: Arc<dyn PipelineRepository>,
    active: Arc<ActiveRuns>,
}

impl PipelineRegistry {
    pub fn new(pipelines: Arc<dyn PipelineRepository>, active: Arc<ActiveRuns>) -> Self {
        Self { pipelines, active }
    }

    /// Create a new pipeline
    pub async fn create(&self, req: CreatePipeline) -> Result<Pipeline> {
        validate_request(&req)?;

        let now = Utc::now();
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            repository: req.repository,
            branch: req.branch,
            stages: req.stages,
            trigger: req.trigger,
            environments: req.environments,
            config: req.config.unwrap_or_default(),
            status: req.status.unwrap_or(PipelineStatus::Active),
            created_at: now,
            updated_at: now,
        };
        self.pipelines.create(pipeline.clone()).await?;

        info!("pipeline created: {} ({})", pipeline.name, pipeline.id);
        Ok(pipeline)
    }

    /// Get a pipeline by ID
    pub async fn get(&self, id: Uuid) -> Result<Pipeline> {
        self.pipelines
            .get(id)
            .await?
            .ok_or(EngineError::PipelineNotFound(id))
    }

    /// List all pipelines
    pub async fn list(&self) -> Result<Vec<PipelineSummary>> {
        let pipelines = self.pipelines.list().await?;
        Ok(pipelines.into_iter().map(PipelineSummary::from).collect())
    }

    /// Replace a pipeline's definition
    pub async fn update(&self, id: Uuid, req: CreatePipeline) -> Result<Pipeline> {
        validate_request(&req)?;
        let existing = self.get(id).await?;

        let pipeline = Pipeline {
            id,
            name: req.name,
            description: req.description,
            repository: req.repository,
            branch: req.branch,
            stages: req.stages,
            trigger: req.trigger,
            environments: req.environments,
            config: req.config.unwrap_or_default(),
            status: req.status.unwrap_or(existing.status),
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };

        if !self.pipelines.update(pipeline.clone()).await? {
            return Err(EngineError::PipelineNotFound(id));
        }
        Ok(pipeline)
    }

    /// Change only the lifecycle status (activate a draft, pause, ...)
    pub async fn set_status(&self, id: Uuid, status: PipelineStatus) -> Result<Pipeline> {
        let mut pipeline = self.get(id).await?;
        pipeline.status = status;
        pipeline.updated_at = Utc::now();
        if !self.pipelines.update(pipeline.clone()).await? {
            return Err(EngineError::PipelineNotFound(id));
        }
        info!("pipeline {} status set to {:?}", id, status);
        Ok(pipeline)
    }

    /// Delete a pipeline
    ///
    /// Refused while the pipeline has any live (non-terminal) run.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if self.active.has_active_for(id).await {
            return Err(EngineError::Conflict(format!(
                "pipeline {id} has active runs"
            )));
        }
        if !self.pipelines.delete(id).await? {
            return Err(EngineError::PipelineNotFound(id));
        }
        info!("pipeline deleted: {}", id);
        Ok(())
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_request(req: &CreatePipeline) -> Result<()> {
    if req.name.trim().is_empty() {
        return Err(EngineError::configuration("pipeline name cannot be empty"));
    }
    if req.name.len() > 255 {
        return Err(EngineError::configuration(
            "pipeline name is too long (max 255 characters)",
        ));
    }
    validate_stages(&req.stages)
}

/// Structural validation of a stage list
///
/// Also called at trigger time so a malformed graph never reaches the run
/// executor, whatever path a definition took into the store.
pub(crate) fn validate_stages(stages: &[PipelineStage]) -> Result<()> {
    let mut names = HashSet::new();
    let mut orders = HashSet::new();

    for stage in stages {
        if stage.name.trim().is_empty() {
            return Err(EngineError::configuration("stage name cannot be empty"));
        }
        if !names.insert(stage.name.as_str()) {
            return Err(EngineError::configuration(format!(
                "duplicate stage name '{}'",
                stage.name
            )));
        }
        if !orders.insert(stage.order) {
            return Err(EngineError::configuration(format!(
                "duplicate stage order {} on stage '{}'",
                stage.order, stage.name
            )));
        }

        for config in &stage.approvals {
            if config.required as usize > config.approvers.len() {
                return Err(EngineError::configuration(format!(
                    "stage '{}' requires {} approvals but lists {} approvers",
                    stage.name,
                    config.required,
                    config.approvers.len()
                )));
            }
        }
    }

    // Dependencies must point strictly backwards, which also rules out
    // cycles.
    for stage in stages {
        for dep in &stage.depends_on {
            let Some(target) = stages.iter().find(|s| &s.name == dep) else {
                return Err(EngineError::configuration(format!(
                    "stage '{}' depends on unknown stage '{}'",
                    stage.name, dep
                )));
            };
            if target.order >= stage.order {
                return Err(EngineError::configuration(format!(
                    "stage '{}' depends on '{}' which does not precede it",
                    stage.name, dep
                )));
            }
        }
    }

    Ok(())
}
