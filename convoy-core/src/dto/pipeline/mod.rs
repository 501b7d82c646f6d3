//! Pipeline DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{Pipeline, PipelineConfig, PipelineStatus, TriggerConfig};
use crate::domain::stage::PipelineStage;

/// Request to create a pipeline; also the full-replacement update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    pub description: Option<String>,
    pub repository: String,
    pub branch: String,
    pub stages: Vec<PipelineStage>,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub environments: Vec<String>,
    pub config: Option<PipelineConfig>,
    /// Initial status; defaults to `Active` when omitted
    pub status: Option<PipelineStatus>,
}

/// Lightweight pipeline summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub repository: String,
    pub branch: String,
    pub status: PipelineStatus,
    pub stage_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Pipeline> for PipelineSummary {
    fn from(pipeline: Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name,
            description: pipeline.description,
            repository: pipeline.repository,
            branch: pipeline.branch,
            status: pipeline.status,
            stage_count: pipeline.stages.len(),
            created_at: pipeline.created_at,
            updated_at: pipeline.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_summary_conversion() {
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            name: "web".to_string(),
            description: Some("frontend deploys".to_string()),
            repository: "git@example.com:acme/web.git".to_string(),
            branch: "main".to_string(),
            stages: vec![],
            trigger: TriggerConfig::default(),
            environments: vec!["staging".to_string()],
            config: PipelineConfig::default(),
            status: PipelineStatus::Active,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let summary: PipelineSummary = pipeline.clone().into();
        assert_eq!(summary.id, pipeline.id);
        assert_eq!(summary.name, pipeline.name);
        assert_eq!(summary.stage_count, 0);
    }
}
