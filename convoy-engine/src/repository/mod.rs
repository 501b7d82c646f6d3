//! Repository abstraction
//!
//! Persistence seam for the engine. The orchestrator depends only on these
//! traits; concrete stores (in-memory for tests and embedding, a database
//! for production) are injected at construction time, never reached
//! through module-level state.

use async_trait::async_trait;
use uuid::Uuid;

use convoy_core::domain::pipeline::Pipeline;
use convoy_core::domain::run::PipelineRun;
use convoy_core::domain::template::PipelineTemplate;

use crate::error::Result;

pub mod memory;

pub use memory::{InMemoryPipelines, InMemoryRuns, InMemoryTemplates};

/// Persistence operations for pipeline definitions
///
/// Write operations must be serialized per pipeline id; reads may serve a
/// snapshot of the last committed state.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn create(&self, pipeline: Pipeline) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Pipeline>>;
    async fn update(&self, pipeline: Pipeline) -> Result<bool>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn list(&self) -> Result<Vec<Pipeline>>;
}

/// Persistence operations for pipeline runs
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: PipelineRun) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PipelineRun>>;
    async fn update(&self, run: PipelineRun) -> Result<bool>;
    async fn list_for_pipeline(&self, pipeline_id: Uuid) -> Result<Vec<PipelineRun>>;
}

/// Persistence operations for pipeline templates
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn insert(&self, template: PipelineTemplate) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PipelineTemplate>>;
    async fn list(&self) -> Result<Vec<PipelineTemplate>>;
}
