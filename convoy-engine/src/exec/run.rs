//! Run executor
//!
//! The top-level state machine. A trigger creates a run and spawns a task
//! that drives it stage by stage: dependency gate, condition check, stage
//! execution, and the terminal transition with rollback consultation and
//! notification dispatch. Approval suspends the run as a checkpoint; an
//! approval submission dispatches a resume event instead of re-entering
//! the loop recursively.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use convoy_core::domain::log::LogLevel;
use convoy_core::domain::pipeline::{Pipeline, PipelineStatus, QualityGate, RunEvent};
use convoy_core::domain::run::{
    PipelineRun, RunCheckpoint, RunStatus, StageRun, StageRunStatus, TriggerDescriptor,
};
use convoy_core::domain::stage::{PipelineStage, StageType};
use convoy_core::dto::run::SubmitApproval;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::exec::action::ActionExecutor;
use crate::exec::approval::{self, ApprovalGate};
use crate::exec::rollback::{self, AlwaysHealthy, HealthFeed};
use crate::exec::{conditions, stage as stage_exec};
use crate::notify::{self, NotificationSink, TracingSink};
use crate::repository::{PipelineRepository, RunRepository};
use crate::service::registry::validate_stages;
use crate::state::ActiveRuns;

/// The orchestration engine
///
/// Cheap to clone; every clone shares the same repositories, active-run
/// set and run-slot semaphore.
#[derive(Clone)]
pub struct Engine {
    pipelines: Arc<dyn PipelineRepository>,
    runs: Arc<dyn RunRepository>,
    executor: Arc<dyn ActionExecutor>,
    health: Arc<dyn HealthFeed>,
    notifier: Arc<dyn NotificationSink>,
    config: EngineConfig,
    active: Arc<ActiveRuns>,
    run_slots: Arc<Semaphore>,
    /// Serializes run state transitions across submit/cancel/expire paths
    transitions: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(
        pipelines: Arc<dyn PipelineRepository>,
        runs: Arc<dyn RunRepository>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            pipelines,
            runs,
            executor,
            health: Arc::new(AlwaysHealthy),
            notifier: Arc::new(TracingSink),
            run_slots: Arc::new(Semaphore::new(config.max_concurrent_runs)),
            config,
            active: Arc::new(ActiveRuns::new()),
            transitions: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.run_slots = Arc::new(Semaphore::new(config.max_concurrent_runs));
        self.config = config;
        self
    }

    pub fn with_health_feed(mut self, health: Arc<dyn HealthFeed>) -> Self {
        self.health = health;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The live-run set, shared with the registry for delete conflicts
    pub fn active_runs(&self) -> Arc<ActiveRuns> {
        Arc::clone(&self.active)
    }

    /// Fetches a run snapshot
    pub async fn get_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        self.runs
            .get(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Creates a run for the pipeline and starts driving it
    ///
    /// Fails with a configuration error unless the pipeline exists, is
    /// `Active`, and carries a well-formed stage graph. The returned run
    /// is a snapshot in `Pending`; execution proceeds asynchronously.
    pub async fn trigger_pipeline(
        &self,
        pipeline_id: Uuid,
        trigger: TriggerDescriptor,
    ) -> Result<PipelineRun> {
        let pipeline = self
            .pipelines
            .get(pipeline_id)
            .await?
            .ok_or_else(|| {
                EngineError::configuration(format!("pipeline {pipeline_id} does not exist"))
            })?;

        if pipeline.status != PipelineStatus::Active {
            return Err(EngineError::configuration(format!(
                "pipeline '{}' is not active (status: {:?})",
                pipeline.name, pipeline.status
            )));
        }
        validate_stages(&pipeline.stages)?;

        let mut run = PipelineRun::new(pipeline_id, trigger);
        run.log(
            LogLevel::Info,
            format!("run created for pipeline '{}'", pipeline.name),
        );
        self.runs.create(run.clone()).await?;

        let cancel = self.active.register(run.id, pipeline_id).await;
        info!("triggered pipeline '{}': run {}", pipeline.name, run.id);

        let engine = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            engine.drive(run_id, pipeline, 0, cancel).await;
        });

        Ok(run)
    }

    /// Requests cancellation of a run
    ///
    /// A no-op on terminal runs (the run is returned unchanged). A
    /// suspended run is cancelled immediately; a driving run observes the
    /// flag at its next stage or retry-attempt boundary, letting any
    /// in-flight action finish first.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let _guard = self.transitions.lock().await;
        let mut run = self.get_run(run_id).await?;

        if run.status.is_terminal() {
            return Ok(run);
        }

        if run.status == RunStatus::WaitingApproval {
            // No task is driving a suspended run; transition it here.
            close_waiting_stage(
                &mut run,
                StageRunStatus::Cancelled,
                "cancelled while waiting for approval",
            );
            let pipeline = self.pipelines.get(run.pipeline_id).await?;
            return self
                .finalize_locked(run, pipeline.as_ref(), RunStatus::Cancelled)
                .await;
        }

        self.active.request_cancel(run_id).await;
        run.log(LogLevel::Warning, "cancellation requested");
        self.runs.update(run.clone()).await?;
        Ok(run)
    }

    /// Records one approver's decision and resumes the run when the
    /// quorum is reached
    ///
    /// Fails with `ApprovalNotFound` when no pending request exists for
    /// the approver/stage pair; an already-decided approver cannot
    /// overwrite their decision. Submissions after the approval window
    /// closed fail the run and return `ApprovalTimeout`.
    pub async fn submit_approval(&self, req: SubmitApproval) -> Result<PipelineRun> {
        let guard = self.transitions.lock().await;
        let mut run = self.get_run(req.run_id).await?;
        let pipeline = self
            .pipelines
            .get(run.pipeline_id)
            .await?
            .ok_or(EngineError::PipelineNotFound(run.pipeline_id))?;
        let stage = pipeline
            .stages
            .iter()
            .find(|s| s.id == req.stage_id)
            .ok_or_else(|| {
                EngineError::configuration(format!(
                    "stage {} is not part of pipeline '{}'",
                    req.stage_id, pipeline.name
                ))
            })?
            .clone();

        let window_expired = run.checkpoint.as_ref().is_some_and(|cp| {
            Utc::now() - cp.waiting_since
                > chrono::Duration::seconds(cp.approval_timeout_secs as i64)
        });
        if window_expired {
            warn!("late approval for run {}: window expired", run.id);
            close_waiting_stage(&mut run, StageRunStatus::Failed, "approval window expired");
            self.finalize_locked(run, Some(&pipeline), RunStatus::Failed)
                .await?;
            return Err(EngineError::ApprovalTimeout { stage: stage.name });
        }

        let not_found = || EngineError::ApprovalNotFound {
            run_id: req.run_id,
            stage_id: req.stage_id,
            approver: req.approver.clone(),
        };
        let verdict = {
            let stage_run = run
                .stage_runs
                .iter_mut()
                .find(|sr| sr.stage_id == req.stage_id)
                .ok_or_else(not_found)?;
            if !approval::record_decision(stage_run, &req.approver, req.approved, req.comment.clone())
            {
                return Err(not_found());
            }
            approval::gate(&stage, stage_run)
        };

        match verdict {
            ApprovalGate::Wait => {
                self.runs.update(run.clone()).await?;
                Ok(run)
            }
            ApprovalGate::Rejected => {
                close_waiting_stage(&mut run, StageRunStatus::Failed, "approval rejected");
                self.finalize_locked(run, Some(&pipeline), RunStatus::Failed)
                    .await
            }
            ApprovalGate::Proceed => {
                if run.status != RunStatus::WaitingApproval {
                    self.runs.update(run.clone()).await?;
                    return Ok(run);
                }
                let Some(checkpoint) = run.checkpoint.take() else {
                    self.runs.update(run.clone()).await?;
                    return Ok(run);
                };
                run.log(LogLevel::Info, "approval quorum reached; resuming run");
                self.runs.update(run.clone()).await?;

                let cancel = match self.active.cancel_flag(run.id).await {
                    Some(flag) => flag,
                    None => self.active.register(run.id, run.pipeline_id).await,
                };
                info!("resuming run {} at stage index {}", run.id, checkpoint.stage_index);

                let engine = self.clone();
                let run_id = run.id;
                drop(guard);
                tokio::spawn(async move {
                    engine
                        .drive(run_id, pipeline, checkpoint.stage_index, cancel)
                        .await;
                });
                Ok(run)
            }
        }
    }

    /// Drives a run to suspension or a terminal state; never propagates
    /// errors out of the task
    async fn drive(
        self,
        run_id: Uuid,
        pipeline: Pipeline,
        start_index: usize,
        cancel: Arc<AtomicBool>,
    ) {
        let _permit = Arc::clone(&self.run_slots).acquire_owned().await.ok();
        if let Err(e) = self
            .drive_inner(run_id, &pipeline, start_index, &cancel)
            .await
        {
            error!("drive task for run {} failed: {:#}", run_id, e);
        }
    }

    async fn drive_inner(
        &self,
        run_id: Uuid,
        pipeline: &Pipeline,
        start_index: usize,
        cancel: &AtomicBool,
    ) -> Result<()> {
        let mut run = self.get_run(run_id).await?;
        run.status = RunStatus::Running;
        run.checkpoint = None;
        run.log(
            LogLevel::Info,
            if start_index == 0 { "run started" } else { "run resumed" },
        );
        self.runs.update(run.clone()).await?;

        let stages = pipeline.ordered_stages();
        let mut index = start_index;

        while index < stages.len() {
            let stage = stages[index];

            if cancel.load(Ordering::SeqCst) {
                run.log(LogLevel::Warning, "run cancelled");
                self.finalize(run, Some(pipeline), RunStatus::Cancelled).await?;
                return Ok(());
            }

            // Rollback stages hold the rollback action set; they never run
            // in the forward direction.
            if stage.stage_type == StageType::Rollback {
                debug!("stage '{}' reserved for rollback", stage.name);
                index += 1;
                continue;
            }

            if !dependencies_satisfied(stage, &run) {
                run.log_stage(
                    LogLevel::Warning,
                    &stage.name,
                    "skipped: dependencies did not succeed",
                );
                self.runs.update(run.clone()).await?;
                index += 1;
                continue;
            }

            if !conditions::stage_should_run(stage, &run, &run.trigger) {
                run.log_stage(LogLevel::Info, &stage.name, "skipped: entry conditions not met");
                self.runs.update(run.clone()).await?;
                index += 1;
                continue;
            }

            let prior = take_waiting_stage_run(&mut run, stage.id);
            let stage_run =
                stage_exec::execute_stage(stage, &run, prior, &self.executor, cancel, &self.config)
                    .await;
            let status = stage_run.status;
            absorb_stage_run(&mut run, stage_run);

            match status {
                StageRunStatus::Success | StageRunStatus::Running => {
                    self.runs.update(run.clone()).await?;
                    index += 1;
                }
                StageRunStatus::WaitingApproval => {
                    let timeout = approval_window(stage, &self.config);
                    run.status = RunStatus::WaitingApproval;
                    run.checkpoint = Some(RunCheckpoint {
                        stage_index: index,
                        waiting_since: Utc::now(),
                        approval_timeout_secs: timeout.as_secs(),
                    });
                    run.log_stage(LogLevel::Info, &stage.name, "waiting for approval");
                    self.runs.update(run.clone()).await?;
                    self.dispatch(&run, pipeline, RunEvent::WaitingApproval).await;
                    self.spawn_approval_watchdog(run.id, index, timeout, pipeline.clone());
                    info!("run {} suspended at stage '{}'", run.id, stage.name);
                    return Ok(());
                }
                StageRunStatus::Failed => {
                    run.log_stage(LogLevel::Error, &stage.name, "stage failed");
                    if rollback::should_rollback(&run, pipeline, &self.health).await {
                        let reason =
                            format!("automatic rollback after stage '{}' failed", stage.name);
                        let info = rollback::execute_rollback(
                            &mut run,
                            pipeline,
                            &self.executor,
                            self.config.rollback_timeout,
                            reason,
                        )
                        .await;
                        run.rollback = Some(info);
                    }
                    self.finalize(run, Some(pipeline), RunStatus::Failed).await?;
                    return Ok(());
                }
                StageRunStatus::Cancelled => {
                    self.finalize(run, Some(pipeline), RunStatus::Cancelled).await?;
                    return Ok(());
                }
            }
        }

        if let Some(gate) = unmet_quality_gate(pipeline, &run) {
            run.log(
                LogLevel::Error,
                format!("quality gate '{}' not met", gate.name),
            );
            self.finalize(run, Some(pipeline), RunStatus::Failed).await?;
            return Ok(());
        }

        self.finalize(run, Some(pipeline), RunStatus::Success).await?;
        Ok(())
    }

    async fn finalize(
        &self,
        run: PipelineRun,
        pipeline: Option<&Pipeline>,
        status: RunStatus,
    ) -> Result<PipelineRun> {
        let _guard = self.transitions.lock().await;
        self.finalize_locked(run, pipeline, status).await
    }

    /// Terminal transition; caller must hold the transitions lock
    ///
    /// Stamps completion, releases the active-run slot and dispatches
    /// notifications exactly once. A run that is already terminal in the
    /// store is left untouched.
    async fn finalize_locked(
        &self,
        mut run: PipelineRun,
        pipeline: Option<&Pipeline>,
        status: RunStatus,
    ) -> Result<PipelineRun> {
        if let Some(stored) = self.runs.get(run.id).await? {
            if stored.status.is_terminal() {
                return Ok(stored);
            }
        }

        run.status = status;
        let now = Utc::now();
        run.completed_at = Some(now);
        run.duration_secs = Some((now - run.started_at).num_seconds());
        run.checkpoint = None;
        run.log(LogLevel::Info, format!("run finished: {status:?}"));
        self.runs.update(run.clone()).await?;
        self.active.release(run.id).await;

        let event = match status {
            RunStatus::Success => Some(RunEvent::Succeeded),
            RunStatus::Cancelled => Some(RunEvent::Cancelled),
            RunStatus::Failed => Some(if run.rollback.is_some() {
                RunEvent::RolledBack
            } else {
                RunEvent::Failed
            }),
            _ => None,
        };
        if let (Some(pipeline), Some(event)) = (pipeline, event) {
            self.dispatch(&run, pipeline, event).await;
        }

        info!("run {} finished: {:?}", run.id, status);
        Ok(run)
    }

    async fn dispatch(&self, run: &PipelineRun, pipeline: &Pipeline, event: RunEvent) {
        for note in notify::notifications_for(run, pipeline, event) {
            if let Err(e) = self.notifier.send(note).await {
                warn!("notification dispatch failed for run {}: {}", run.id, e);
            }
        }
    }

    fn spawn_approval_watchdog(
        &self,
        run_id: Uuid,
        stage_index: usize,
        timeout: Duration,
        pipeline: Pipeline,
    ) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Err(e) = engine.expire_approval(run_id, stage_index, &pipeline).await {
                error!("approval watchdog for run {} failed: {:#}", run_id, e);
            }
        });
    }

    /// Fails a run still waiting at the given stage index once its
    /// approval window elapsed
    async fn expire_approval(
        &self,
        run_id: Uuid,
        stage_index: usize,
        pipeline: &Pipeline,
    ) -> Result<()> {
        let _guard = self.transitions.lock().await;
        let Some(mut run) = self.runs.get(run_id).await? else {
            return Ok(());
        };
        let still_waiting = run.status == RunStatus::WaitingApproval
            && run
                .checkpoint
                .as_ref()
                .is_some_and(|cp| cp.stage_index == stage_index);
        if !still_waiting {
            return Ok(());
        }

        warn!("approval window expired for run {}", run_id);
        close_waiting_stage(&mut run, StageRunStatus::Failed, "approval window expired");
        self.finalize_locked(run, Some(pipeline), RunStatus::Failed)
            .await?;
        Ok(())
    }
}

/// Closes the suspended stage run with the given status and reason
fn close_waiting_stage(run: &mut PipelineRun, status: StageRunStatus, reason: &str) {
    if let Some(stage_run) = run
        .stage_runs
        .iter_mut()
        .find(|sr| sr.status == StageRunStatus::WaitingApproval)
    {
        stage_run.log(LogLevel::Error, reason);
        stage_run.error = Some(reason.to_string());
        stage_run.complete(status);
    }
    run.log(LogLevel::Error, reason);
}

/// All declared dependencies reached success, or were skipped entirely
///
/// Stage ordering guarantees a dependency was already considered; a
/// missing stage run therefore means its conditions skipped it, which
/// satisfies the dependency the same way success does.
fn dependencies_satisfied(stage: &PipelineStage, run: &PipelineRun) -> bool {
    stage.depends_on.iter().all(|dep| {
        match run.stage_run_by_name(dep) {
            Some(stage_run) => stage_run.status == StageRunStatus::Success,
            None => true,
        }
    })
}

/// Removes and returns the suspended stage run for the stage, if any
fn take_waiting_stage_run(run: &mut PipelineRun, stage_id: Uuid) -> Option<StageRun> {
    let position = run
        .stage_runs
        .iter()
        .position(|sr| sr.stage_id == stage_id && sr.status == StageRunStatus::WaitingApproval)?;
    Some(run.stage_runs.remove(position))
}

/// Folds a finished stage run into the run's aggregates
fn absorb_stage_run(run: &mut PipelineRun, stage_run: StageRun) {
    let executed = stage_run
        .metrics
        .get(stage_exec::ACTIONS_EXECUTED)
        .copied()
        .unwrap_or(0.0) as u32;
    let failed = stage_run
        .metrics
        .get(stage_exec::ACTIONS_FAILED)
        .copied()
        .unwrap_or(0.0) as u32;
    run.metrics.actions_total += executed;
    run.metrics.actions_failed += failed;
    for (key, value) in &stage_run.metrics {
        if key != stage_exec::ACTIONS_EXECUTED && key != stage_exec::ACTIONS_FAILED {
            run.metrics.observed.insert(key.clone(), *value);
        }
    }
    run.artifacts.extend(stage_run.artifacts.iter().cloned());
    run.stage_runs.push(stage_run);
}

/// Earliest configured approval window on the stage
fn approval_window(stage: &PipelineStage, config: &EngineConfig) -> Duration {
    stage
        .approvals
        .iter()
        .filter(|a| a.timeout_secs > 0)
        .map(|a| Duration::from_secs(a.timeout_secs))
        .min()
        .unwrap_or(config.default_approval_timeout)
}

/// First quality gate the run does not satisfy, if any
fn unmet_quality_gate<'a>(pipeline: &'a Pipeline, run: &PipelineRun) -> Option<&'a QualityGate> {
    pipeline.config.quality_gates.iter().find(|gate| {
        let observed = run
            .metrics
            .observed
            .get(&gate.metric)
            .copied()
            .or_else(|| (gate.metric == "error_rate").then(|| run.metrics.failure_ratio()));
        match observed {
            Some(value) => !gate.satisfied_by(value),
            // A gate that cannot be checked has not passed.
            None => true,
        }
    })
}
