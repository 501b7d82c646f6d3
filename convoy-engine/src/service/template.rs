//! Template Catalog
//!
//! Reusable pipeline blueprints. Instantiation merges template defaults
//! with caller overrides and flows through the registry, so instantiated
//! pipelines are validated like any other; they always start in `Draft`
//! and must be explicitly activated.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use convoy_core::domain::pipeline::{Pipeline, PipelineStatus, TriggerConfig};
use convoy_core::domain::stage::{
    ApprovalConfig, ConditionKind, ConditionOperator, PipelineStage, RetryPolicy, StageCondition,
    StageType,
};
use convoy_core::domain::template::PipelineTemplate;
use convoy_core::dto::pipeline::CreatePipeline;
use convoy_core::dto::template::InstantiateTemplate;

use crate::error::{EngineError, Result};
use crate::repository::TemplateRepository;
use crate::service::registry::PipelineRegistry;

/// Template catalog service
#[derive(Clone)]
pub struct TemplateCatalog {
    templates: Arc<dyn TemplateRepository>,
    registry: PipelineRegistry,
}

impl TemplateCatalog {
    pub fn new(templates: Arc<dyn TemplateRepository>, registry: PipelineRegistry) -> Self {
        Self { templates, registry }
    }

    /// List all templates
    pub async fn list(&self) -> Result<Vec<PipelineTemplate>> {
        self.templates.list().await
    }

    /// Seeds the catalog with the built-in blueprints
    pub async fn seed_builtin(&self) -> Result<()> {
        for template in builtin_templates() {
            self.templates.insert(template).await?;
        }
        Ok(())
    }

    /// Instantiate a pipeline from a template
    ///
    /// Template stages are copied with fresh identities so instances never
    /// share stage or approval ids with the blueprint.
    pub async fn instantiate(
        &self,
        template_id: Uuid,
        req: InstantiateTemplate,
    ) -> Result<Pipeline> {
        let template = self
            .templates
            .get(template_id)
            .await?
            .ok_or(EngineError::TemplateNotFound(template_id))?;

        let create = CreatePipeline {
            name: req.name,
            description: template.description.clone(),
            repository: req.repository,
            branch: req.branch,
            stages: template.stages.iter().map(fresh_identity).collect(),
            trigger: TriggerConfig {
                manual: true,
                ..TriggerConfig::default()
            },
            environments: req.environments,
            config: Some(req.config.unwrap_or_else(|| template.config.clone())),
            status: Some(PipelineStatus::Draft),
        };

        let pipeline = self.registry.create(create).await?;
        info!(
            "instantiated pipeline '{}' from template '{}'",
            pipeline.name, template.name
        );
        Ok(pipeline)
    }
}

fn fresh_identity(stage: &PipelineStage) -> PipelineStage {
    let mut copy = stage.clone();
    copy.id = Uuid::new_v4();
    for action in &mut copy.actions {
        action.id = Uuid::new_v4();
    }
    for approval in &mut copy.approvals {
        approval.id = Uuid::new_v4();
    }
    copy
}

/// The classic release blueprint: build, test, staged deploy behind a
/// manual gate, then production
pub fn builtin_templates() -> Vec<PipelineTemplate> {
    let mut test = PipelineStage::new("test", StageType::Test, 2);
    test.retry = RetryPolicy {
        enabled: true,
        max_attempts: 2,
        ..RetryPolicy::default()
    };
    test.depends_on.push("build".to_string());

    let mut deploy_staging = PipelineStage::new("deploy-staging", StageType::Deploy, 3);
    deploy_staging.environment = Some("staging".to_string());
    deploy_staging.depends_on.push("test".to_string());

    let mut gate = PipelineStage::new("production-gate", StageType::ManualApproval, 4);
    gate.approvals
        .push(ApprovalConfig::new(vec!["release-manager".to_string()], 1));
    gate.conditions.push(StageCondition {
        kind: ConditionKind::PreviousStage,
        operator: ConditionOperator::Equals,
        key: None,
        value: Some("deploy-staging".to_string()),
    });

    let mut deploy_production = PipelineStage::new("deploy-production", StageType::Deploy, 5);
    deploy_production.environment = Some("production".to_string());
    deploy_production.depends_on.push("production-gate".to_string());

    vec![PipelineTemplate {
        id: Uuid::new_v4(),
        name: "release".to_string(),
        description: Some("build, test, staged deploy with a production gate".to_string()),
        stages: vec![
            PipelineStage::new("build", StageType::Build, 1),
            test,
            deploy_staging,
            gate,
            deploy_production,
        ],
        config: Default::default(),
        created_at: Utc::now(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryPipelines, InMemoryTemplates};
    use crate::state::ActiveRuns;

    fn catalog() -> TemplateCatalog {
        let registry =
            PipelineRegistry::new(Arc::new(InMemoryPipelines::new()), Arc::new(ActiveRuns::new()));
        TemplateCatalog::new(Arc::new(InMemoryTemplates::new()), registry)
    }

    #[tokio::test]
    async fn test_seed_and_list() {
        let catalog = catalog();
        catalog.seed_builtin().await.unwrap();
        let templates = catalog.list().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "release");
        assert_eq!(templates[0].stages.len(), 5);
    }

    #[tokio::test]
    async fn test_instantiate_starts_in_draft() {
        let catalog = catalog();
        catalog.seed_builtin().await.unwrap();
        let template = catalog.list().await.unwrap().remove(0);

        let pipeline = catalog
            .instantiate(
                template.id,
                InstantiateTemplate {
                    name: "web-release".to_string(),
                    repository: "git@example.com:acme/web.git".to_string(),
                    branch: "main".to_string(),
                    environments: vec!["staging".to_string(), "production".to_string()],
                    config: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(pipeline.status, PipelineStatus::Draft);
        assert_eq!(pipeline.stages.len(), template.stages.len());
        // Fresh identities: no stage id shared with the blueprint.
        for stage in &pipeline.stages {
            assert!(template.stages.iter().all(|t| t.id != stage.id));
        }
    }

    #[tokio::test]
    async fn test_instantiate_unknown_template() {
        let catalog = catalog();
        let err = catalog
            .instantiate(
                Uuid::new_v4(),
                InstantiateTemplate {
                    name: "x".to_string(),
                    repository: "r".to_string(),
                    branch: "main".to_string(),
                    environments: vec![],
                    config: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
