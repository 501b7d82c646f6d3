//! Template domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::PipelineConfig;
use crate::domain::stage::PipelineStage;

/// A reusable pipeline blueprint: default stages plus default configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub stages: Vec<PipelineStage>,
    pub config: PipelineConfig,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
