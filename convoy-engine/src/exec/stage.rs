//! Stage executor
//!
//! Runs the ordered action list of one stage against a run: approval gate
//! first, then actions (sequentially, or fanned out when the stage asks
//! for parallel execution), with per-attempt timeout and retry backoff.
//! Every attempt appends to the stage run's log regardless of outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use convoy_core::domain::log::LogLevel;
use convoy_core::domain::run::{PipelineRun, StageRun, StageRunStatus};
use convoy_core::domain::stage::{ErrorClass, PipelineStage};

use crate::config::EngineConfig;
use crate::exec::action::{ActionContext, ActionError, ActionExecutor, ActionOutcome};
use crate::exec::approval::{self, ApprovalGate};
use crate::exec::retry;

/// Stage-run metric key: action executions attempted
pub const ACTIONS_EXECUTED: &str = "actions_executed";
/// Stage-run metric key: action executions that failed
pub const ACTIONS_FAILED: &str = "actions_failed";

/// Executes one stage against a run and returns its StageRun
///
/// `prior` carries the suspended stage run when the engine resumes a stage
/// whose approval quorum was just reached; its recorded approvals and logs
/// continue instead of starting over.
pub async fn execute_stage(
    stage: &PipelineStage,
    run: &PipelineRun,
    prior: Option<StageRun>,
    executor: &Arc<dyn ActionExecutor>,
    cancel: &AtomicBool,
    config: &EngineConfig,
) -> StageRun {
    let mut stage_run = prior.unwrap_or_else(|| StageRun::new(stage));
    stage_run.status = StageRunStatus::Running;

    if !stage.approvals.is_empty() {
        for approval_config in &stage.approvals {
            approval::ensure_pending(approval_config, &mut stage_run);
        }
        match approval::gate(stage, &stage_run) {
            ApprovalGate::Wait => {
                stage_run.log(LogLevel::Info, "waiting for approval quorum");
                stage_run.status = StageRunStatus::WaitingApproval;
                return stage_run;
            }
            ApprovalGate::Rejected => {
                stage_run.log(LogLevel::Error, "approval rejected");
                stage_run.error = Some("approval rejected".to_string());
                stage_run.complete(StageRunStatus::Failed);
                return stage_run;
            }
            ApprovalGate::Proceed => {
                stage_run.log(LogLevel::Info, "approval quorum reached");
            }
        }
    }

    if stage.actions.is_empty() {
        stage_run.complete(StageRunStatus::Success);
        return stage_run;
    }

    let ctx = ActionContext {
        run_id: run.id,
        pipeline_id: run.pipeline_id,
        stage_name: stage.name.clone(),
        environment: stage.environment.clone(),
        variables: run.trigger.variables.clone(),
    };

    let timeout = if stage.timeout_secs == 0 {
        config.default_stage_timeout
    } else {
        std::time::Duration::from_secs(stage.timeout_secs)
    };

    loop {
        stage_run.attempts += 1;
        let attempt = stage_run.attempts;
        stage_run.log(LogLevel::Info, format!("attempt {attempt} started"));
        debug!("stage '{}' attempt {}", stage.name, attempt);

        let attempt_result =
            tokio::time::timeout(timeout, run_actions(stage, &mut stage_run, &ctx, executor))
                .await;

        let error = match attempt_result {
            Ok(Ok(())) => {
                stage_run.log(LogLevel::Info, format!("attempt {attempt} succeeded"));
                stage_run.complete(StageRunStatus::Success);
                info!("stage '{}' succeeded on attempt {}", stage.name, attempt);
                return stage_run;
            }
            Ok(Err(err)) => err,
            Err(_) => ActionError::timeout(format!(
                "stage '{}' timed out after {}s",
                stage.name,
                timeout.as_secs()
            )),
        };

        stage_run.log(
            LogLevel::Error,
            format!("attempt {attempt} failed: {error}"),
        );
        warn!("stage '{}' attempt {} failed: {}", stage.name, attempt, error);

        let delay = if retry::class_retryable(&stage.retry, error.class) {
            retry::next_attempt(&stage.retry, attempt)
        } else {
            None
        };

        match delay {
            Some(delay) if !cancel.load(Ordering::SeqCst) => {
                let delay = delay.min(config.max_retry_delay);
                stage_run.log(
                    LogLevel::Info,
                    format!("retrying in {}s", delay.as_secs()),
                );
                tokio::time::sleep(delay).await;
            }
            _ => {
                if cancel.load(Ordering::SeqCst) {
                    stage_run.log(LogLevel::Warning, "cancelled before next attempt");
                    stage_run.complete(StageRunStatus::Cancelled);
                } else {
                    stage_run.error = Some(error.to_string());
                    stage_run.complete(StageRunStatus::Failed);
                }
                return stage_run;
            }
        }
    }
}

/// Runs the stage's action list once, aborting on the first failure
///
/// A parallel stage fans its actions out as tasks and joins them all; the
/// first failure (in declaration order) is reported, but every spawned
/// action is allowed to finish.
async fn run_actions(
    stage: &PipelineStage,
    stage_run: &mut StageRun,
    ctx: &ActionContext,
    executor: &Arc<dyn ActionExecutor>,
) -> std::result::Result<(), ActionError> {
    if stage.parallel && stage.actions.len() > 1 {
        let mut handles = Vec::new();
        for action in stage.actions.clone() {
            let executor = Arc::clone(executor);
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                let result = executor.execute(&action, &ctx).await;
                (action.name, result)
            }));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok((name, Ok(outcome))) => absorb_outcome(stage_run, &name, outcome),
                Ok((name, Err(err))) => {
                    absorb_failure(stage_run, &name, &err);
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    let err = ActionError::new(
                        format!("action task panicked: {join_err}"),
                        ErrorClass::Infrastructure,
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    } else {
        for action in &stage.actions {
            stage_run.log(LogLevel::Info, format!("running action '{}'", action.name));
            match executor.execute(action, ctx).await {
                Ok(outcome) => absorb_outcome(stage_run, &action.name, outcome),
                Err(err) => {
                    absorb_failure(stage_run, &action.name, &err);
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

fn absorb_outcome(stage_run: &mut StageRun, action_name: &str, outcome: ActionOutcome) {
    bump(stage_run, ACTIONS_EXECUTED);
    stage_run.log(LogLevel::Info, format!("action '{action_name}' completed"));
    stage_run.logs.extend(outcome.logs);
    stage_run.artifacts.extend(outcome.artifacts);
    for (key, value) in outcome.metrics {
        stage_run.metrics.insert(key, value);
    }
}

fn absorb_failure(stage_run: &mut StageRun, action_name: &str, error: &ActionError) {
    bump(stage_run, ACTIONS_EXECUTED);
    bump(stage_run, ACTIONS_FAILED);
    stage_run.log(
        LogLevel::Error,
        format!("action '{action_name}' failed: {error}"),
    );
}

fn bump(stage_run: &mut StageRun, key: &str) {
    *stage_run.metrics.entry(key.to_string()).or_insert(0.0) += 1.0;
}
