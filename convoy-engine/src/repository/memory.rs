//! In-memory repositories
//!
//! Map-backed stores behind `tokio::sync::RwLock`. The writer lock
//! serializes all writes to a store, which gives each pipeline id the
//! write serialization the registry requires; reads clone a snapshot of
//! the last committed state.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use convoy_core::domain::pipeline::Pipeline;
use convoy_core::domain::run::PipelineRun;
use convoy_core::domain::template::PipelineTemplate;

use crate::error::Result;
use crate::repository::{PipelineRepository, RunRepository, TemplateRepository};

/// In-memory pipeline store
#[derive(Default)]
pub struct InMemoryPipelines {
    inner: RwLock<HashMap<Uuid, Pipeline>>,
}

impl InMemoryPipelines {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelines {
    async fn create(&self, pipeline: Pipeline) -> Result<()> {
        self.inner.write().await.insert(pipeline.id, pipeline);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Pipeline>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn update(&self, pipeline: Pipeline) -> Result<bool> {
        let mut map = self.inner.write().await;
        match map.get_mut(&pipeline.id) {
            Some(slot) => {
                *slot = pipeline;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<Pipeline>> {
        let mut pipelines: Vec<Pipeline> = self.inner.read().await.values().cloned().collect();
        pipelines.sort_by_key(|p| p.created_at);
        Ok(pipelines)
    }
}

/// In-memory run store
#[derive(Default)]
pub struct InMemoryRuns {
    inner: RwLock<HashMap<Uuid, PipelineRun>>,
}

impl InMemoryRuns {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRuns {
    async fn create(&self, run: PipelineRun) -> Result<()> {
        self.inner.write().await.insert(run.id, run);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PipelineRun>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn update(&self, run: PipelineRun) -> Result<bool> {
        let mut map = self.inner.write().await;
        match map.get_mut(&run.id) {
            Some(slot) => {
                *slot = run;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_for_pipeline(&self, pipeline_id: Uuid) -> Result<Vec<PipelineRun>> {
        let mut runs: Vec<PipelineRun> = self
            .inner
            .read()
            .await
            .values()
            .filter(|r| r.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }
}

/// In-memory template store
#[derive(Default)]
pub struct InMemoryTemplates {
    inner: RwLock<HashMap<Uuid, PipelineTemplate>>,
}

impl InMemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplates {
    async fn insert(&self, template: PipelineTemplate) -> Result<()> {
        self.inner.write().await.insert(template.id, template);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PipelineTemplate>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<PipelineTemplate>> {
        let mut templates: Vec<PipelineTemplate> =
            self.inner.read().await.values().cloned().collect();
        templates.sort_by_key(|t| t.created_at);
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::domain::pipeline::{PipelineConfig, PipelineStatus, TriggerConfig};
    use convoy_core::domain::run::TriggerDescriptor;

    fn sample_pipeline() -> Pipeline {
        Pipeline {
            id: Uuid::new_v4(),
            name: "api".to_string(),
            description: None,
            repository: "git@example.com:acme/api.git".to_string(),
            branch: "main".to_string(),
            stages: vec![],
            trigger: TriggerConfig::default(),
            environments: vec![],
            config: PipelineConfig::default(),
            status: PipelineStatus::Active,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pipeline_crud_roundtrip() {
        let store = InMemoryPipelines::new();
        let pipeline = sample_pipeline();
        let id = pipeline.id;

        store.create(pipeline.clone()).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());
        assert_eq!(store.list().await.unwrap().len(), 1);

        let mut renamed = pipeline;
        renamed.name = "api-v2".to_string();
        assert!(store.update(renamed).await.unwrap());
        assert_eq!(store.get(id).await.unwrap().unwrap().name, "api-v2");

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_pipeline_returns_false() {
        let store = InMemoryPipelines::new();
        assert!(!store.update(sample_pipeline()).await.unwrap());
    }

    #[tokio::test]
    async fn test_runs_listed_per_pipeline() {
        let store = InMemoryRuns::new();
        let pipeline_id = Uuid::new_v4();

        for _ in 0..3 {
            store
                .create(PipelineRun::new(pipeline_id, TriggerDescriptor::manual("dev")))
                .await
                .unwrap();
        }
        store
            .create(PipelineRun::new(Uuid::new_v4(), TriggerDescriptor::manual("dev")))
            .await
            .unwrap();

        assert_eq!(store.list_for_pipeline(pipeline_id).await.unwrap().len(), 3);
    }
}
