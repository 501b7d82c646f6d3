//! Template DTOs

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::PipelineConfig;

/// Caller overrides merged onto a template when instantiating a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantiateTemplate {
    pub name: String,
    pub repository: String,
    pub branch: String,
    #[serde(default)]
    pub environments: Vec<String>,
    /// Replaces the template's default config when present
    pub config: Option<PipelineConfig>,
}
