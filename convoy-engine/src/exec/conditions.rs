//! Condition evaluator
//!
//! Pure functions deciding whether a stage should execute. No clock reads
//! and no mutation: evaluating the same condition against the same run and
//! trigger twice yields the same result, which lets the dependency gate
//! recompute "was that stage skipped" instead of storing it.

use convoy_core::domain::run::{PipelineRun, StageRunStatus, TriggerDescriptor};
use convoy_core::domain::stage::{
    ConditionKind, ConditionOperator, PipelineStage, StageCondition,
};

/// True when every entry condition on the stage holds
///
/// A stage without conditions always runs.
pub fn stage_should_run(
    stage: &PipelineStage,
    run: &PipelineRun,
    trigger: &TriggerDescriptor,
) -> bool {
    stage
        .conditions
        .iter()
        .all(|cond| evaluate(cond, stage, run, trigger))
}

/// Evaluates a single condition
pub fn evaluate(
    cond: &StageCondition,
    stage: &PipelineStage,
    run: &PipelineRun,
    trigger: &TriggerDescriptor,
) -> bool {
    match cond.kind {
        ConditionKind::Branch => compare(cond.operator, trigger.branch.as_deref(), cond.value.as_deref()),
        ConditionKind::Environment => {
            compare(cond.operator, stage.environment.as_deref(), cond.value.as_deref())
        }
        ConditionKind::Variable => {
            let actual = cond
                .key
                .as_deref()
                .and_then(|key| trigger.variable_str(key));
            compare(cond.operator, actual.as_deref(), cond.value.as_deref())
        }
        ConditionKind::PreviousStage => previous_stage_succeeded(cond, run),
        // Reserved; time windows always pass in the minimal design.
        ConditionKind::Time => true,
    }
}

/// True iff the referenced stage succeeded, or was skipped entirely
///
/// A skipped stage leaves no stage run; by stage ordering the reference
/// points backwards, so "no record" means "skipped", which counts as
/// satisfied the same way success does.
fn previous_stage_succeeded(cond: &StageCondition, run: &PipelineRun) -> bool {
    let Some(name) = cond.value.as_deref() else {
        return false;
    };
    match run.stage_run_by_name(name) {
        Some(stage_run) => stage_run.status == StageRunStatus::Success,
        None => true,
    }
}

fn compare(op: ConditionOperator, actual: Option<&str>, expected: Option<&str>) -> bool {
    match op {
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::Equals => match (actual, expected) {
            (Some(a), Some(e)) => a == e,
            _ => false,
        },
        ConditionOperator::NotEquals => match (actual, expected) {
            (Some(a), Some(e)) => a != e,
            (None, Some(_)) => true,
            _ => false,
        },
        ConditionOperator::Contains => match (actual, expected) {
            (Some(a), Some(e)) => a.contains(e),
            _ => false,
        },
    }
}
