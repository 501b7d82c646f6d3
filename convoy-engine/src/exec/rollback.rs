//! Rollback decision engine
//!
//! Consulted once when a run reaches `Failed`. Decides from the pipeline's
//! rollback strategy and the run's observed metrics whether an automatic
//! rollback must begin, and performs it best-effort: a rollback failure is
//! logged as a risk and never re-enters the retry or rollback cycle.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use convoy_core::domain::log::LogLevel;
use convoy_core::domain::pipeline::Pipeline;
use convoy_core::domain::rollback::RollbackTriggerKind;
use convoy_core::domain::run::{PipelineRun, RollbackInfo};
use convoy_core::domain::stage::StageType;

use crate::error::{EngineError, Result};
use crate::exec::action::{ActionContext, ActionExecutor};

/// Externally supplied health signals for response-time and health-check
/// triggers
#[async_trait]
pub trait HealthFeed: Send + Sync {
    /// Current health of the target environment
    async fn healthy(&self, environment: Option<&str>) -> bool;

    /// Observed response time in milliseconds, when the feed has one
    async fn response_time_ms(&self, environment: Option<&str>) -> Option<f64>;
}

/// Health feed that reports everything green; the default when no feed is
/// wired in
pub struct AlwaysHealthy;

#[async_trait]
impl HealthFeed for AlwaysHealthy {
    async fn healthy(&self, _environment: Option<&str>) -> bool {
        true
    }

    async fn response_time_ms(&self, _environment: Option<&str>) -> Option<f64> {
        None
    }
}

/// Whether a failed run must roll back automatically
pub async fn should_rollback(
    run: &PipelineRun,
    pipeline: &Pipeline,
    health: &Arc<dyn HealthFeed>,
) -> bool {
    let strategy = &pipeline.config.rollback;
    if !strategy.automatic {
        return false;
    }

    let environment = failed_environment(run, pipeline);

    for trigger in &strategy.triggers {
        let fired = match trigger.kind {
            RollbackTriggerKind::ErrorRate => run.metrics.failure_ratio() > trigger.threshold,
            RollbackTriggerKind::ResponseTime => health
                .response_time_ms(environment.as_deref())
                .await
                .is_some_and(|ms| ms > trigger.threshold),
            RollbackTriggerKind::HealthCheck => !health.healthy(environment.as_deref()).await,
            // Manual triggers require an explicit external call.
            RollbackTriggerKind::Manual => false,
        };
        if fired {
            info!(
                "rollback trigger {:?} fired for run {} (threshold {})",
                trigger.kind, run.id, trigger.threshold
            );
            return true;
        }
    }

    false
}

/// Performs the pipeline's rollback action set, best-effort
///
/// Records start and completion on the returned [`RollbackInfo`] whether
/// the actions succeeded or not; failures are logged on the run and
/// reported via `succeeded`, never retried.
pub async fn execute_rollback(
    run: &mut PipelineRun,
    pipeline: &Pipeline,
    executor: &Arc<dyn ActionExecutor>,
    timeout: Duration,
    reason: String,
) -> RollbackInfo {
    let mut info = RollbackInfo {
        reason: reason.clone(),
        previous_version: run.trigger.variable_str("previous_version"),
        started_at: Utc::now(),
        completed_at: None,
        succeeded: None,
    };

    run.log(LogLevel::Warning, format!("starting rollback: {reason}"));
    info!("starting rollback for run {}: {}", run.id, reason);

    match tokio::time::timeout(timeout, run_rollback_actions(run, pipeline, executor)).await {
        Ok(Ok(())) => {
            run.log(LogLevel::Info, "rollback completed");
            info.succeeded = Some(true);
        }
        Ok(Err(e)) => {
            error!("rollback for run {} failed: {}", run.id, e);
            run.log(LogLevel::Error, e.to_string());
            info.succeeded = Some(false);
        }
        Err(_) => {
            error!("rollback for run {} timed out after {:?}", run.id, timeout);
            run.log(LogLevel::Error, "rollback timed out");
            info.succeeded = Some(false);
        }
    }

    info.completed_at = Some(Utc::now());
    info
}

async fn run_rollback_actions(
    run: &mut PipelineRun,
    pipeline: &Pipeline,
    executor: &Arc<dyn ActionExecutor>,
) -> Result<()> {
    let rollback_stages: Vec<_> = pipeline
        .ordered_stages()
        .into_iter()
        .filter(|s| s.stage_type == StageType::Rollback)
        .collect();

    if rollback_stages.is_empty() {
        warn!(
            "run {} rolled back but pipeline '{}' declares no rollback stage",
            run.id, pipeline.name
        );
        return Ok(());
    }

    for stage in rollback_stages {
        let ctx = ActionContext {
            run_id: run.id,
            pipeline_id: pipeline.id,
            stage_name: stage.name.clone(),
            environment: stage.environment.clone(),
            variables: run.trigger.variables.clone(),
        };
        for action in &stage.actions {
            run.log_stage(
                LogLevel::Info,
                &stage.name,
                format!("rollback action '{}'", action.name),
            );
            executor.execute(action, &ctx).await.map_err(|e| {
                EngineError::Rollback(format!("action '{}': {}", action.name, e))
            })?;
        }
    }

    Ok(())
}

/// Environment of the stage whose run failed, for health lookups
fn failed_environment(run: &PipelineRun, pipeline: &Pipeline) -> Option<String> {
    run.stage_runs
        .last()
        .and_then(|sr| pipeline.stage_by_name(&sr.stage_name))
        .and_then(|stage| stage.environment.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::domain::pipeline::{PipelineConfig, PipelineStatus, TriggerConfig};
    use convoy_core::domain::rollback::{RollbackStrategy, RollbackTrigger};
    use convoy_core::domain::run::TriggerDescriptor;
    use uuid::Uuid;

    fn pipeline_with_strategy(strategy: RollbackStrategy) -> Pipeline {
        Pipeline {
            id: Uuid::new_v4(),
            name: "svc".to_string(),
            description: None,
            repository: "git@example.com:acme/svc.git".to_string(),
            branch: "main".to_string(),
            stages: vec![],
            trigger: TriggerConfig::default(),
            environments: vec![],
            config: PipelineConfig {
                rollback: strategy,
                ..PipelineConfig::default()
            },
            status: PipelineStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn failed_run(total: u32, failed: u32) -> PipelineRun {
        let mut run = PipelineRun::new(Uuid::new_v4(), TriggerDescriptor::manual("dev"));
        run.metrics.actions_total = total;
        run.metrics.actions_failed = failed;
        run
    }

    #[tokio::test]
    async fn test_manual_strategy_never_automatic() {
        let pipeline = pipeline_with_strategy(RollbackStrategy {
            automatic: false,
            triggers: vec![RollbackTrigger {
                kind: RollbackTriggerKind::ErrorRate,
                threshold: 0.0,
            }],
            ..RollbackStrategy::default()
        });
        let health: Arc<dyn HealthFeed> = Arc::new(AlwaysHealthy);
        assert!(!should_rollback(&failed_run(10, 10), &pipeline, &health).await);
    }

    #[tokio::test]
    async fn test_error_rate_trigger() {
        let pipeline = pipeline_with_strategy(RollbackStrategy {
            automatic: true,
            triggers: vec![RollbackTrigger {
                kind: RollbackTriggerKind::ErrorRate,
                threshold: 0.1,
            }],
            ..RollbackStrategy::default()
        });
        let health: Arc<dyn HealthFeed> = Arc::new(AlwaysHealthy);

        assert!(should_rollback(&failed_run(10, 3), &pipeline, &health).await);
        assert!(!should_rollback(&failed_run(100, 1), &pipeline, &health).await);
    }

    #[tokio::test]
    async fn test_health_check_trigger() {
        struct Degraded;
        #[async_trait]
        impl HealthFeed for Degraded {
            async fn healthy(&self, _environment: Option<&str>) -> bool {
                false
            }
            async fn response_time_ms(&self, _environment: Option<&str>) -> Option<f64> {
                Some(2500.0)
            }
        }

        let pipeline = pipeline_with_strategy(RollbackStrategy {
            automatic: true,
            triggers: vec![RollbackTrigger {
                kind: RollbackTriggerKind::HealthCheck,
                threshold: 0.0,
            }],
            ..RollbackStrategy::default()
        });
        let health: Arc<dyn HealthFeed> = Arc::new(Degraded);
        assert!(should_rollback(&failed_run(1, 0), &pipeline, &health).await);
    }

    #[tokio::test]
    async fn test_manual_trigger_kind_never_fires_here() {
        let pipeline = pipeline_with_strategy(RollbackStrategy {
            automatic: true,
            triggers: vec![RollbackTrigger {
                kind: RollbackTriggerKind::Manual,
                threshold: 0.0,
            }],
            ..RollbackStrategy::default()
        });
        let health: Arc<dyn HealthFeed> = Arc::new(AlwaysHealthy);
        assert!(!should_rollback(&failed_run(10, 10), &pipeline, &health).await);
    }
}
