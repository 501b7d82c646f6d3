//! Stage domain types
//!
//! A stage is one ordered phase of a pipeline: its entry conditions, its
//! action list, its approval gates and its retry policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One ordered phase of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: Uuid,
    pub name: String,
    pub stage_type: StageType,
    /// Position in the pipeline; stages execute in ascending order
    pub order: u32,
    pub conditions: Vec<StageCondition>,
    pub actions: Vec<StageAction>,
    pub approvals: Vec<ApprovalConfig>,
    /// Per-attempt timeout in seconds; 0 means the engine default
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Target environment the stage deploys to or checks against
    pub environment: Option<String>,
    /// Hint to run this stage's own actions concurrently with each other
    pub parallel: bool,
    /// Names of stages that must have a terminal outcome first
    pub depends_on: Vec<String>,
}

impl PipelineStage {
    /// Minimal stage of the given type, ready for field-by-field setup
    pub fn new(name: impl Into<String>, stage_type: StageType, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            stage_type,
            order,
            conditions: Vec::new(),
            actions: Vec::new(),
            approvals: Vec::new(),
            timeout_secs: 0,
            retry: RetryPolicy::default(),
            environment: None,
            parallel: false,
            depends_on: Vec::new(),
        }
    }
}

/// What kind of work a stage performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageType {
    Build,
    Test,
    SecurityScan,
    Deploy,
    SmokeTest,
    IntegrationTest,
    PerformanceTest,
    ManualApproval,
    Notification,
    Rollback,
}

/// Entry condition gating a stage
///
/// A stage's conditions are ANDed; a stage with no conditions always runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCondition {
    pub kind: ConditionKind,
    pub operator: ConditionOperator,
    /// Variable name for `Variable` conditions
    pub key: Option<String>,
    /// Expected value, or the referenced stage name for `PreviousStage`
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    Branch,
    Environment,
    Variable,
    PreviousStage,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    Exists,
}

/// One unit of work inside a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageAction {
    pub id: Uuid,
    pub name: String,
    pub kind: ActionKind,
}

impl StageAction {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
        }
    }
}

/// Typed action configuration
///
/// Closed set: the stage executor dispatches on this enum exhaustively, so
/// adding a variant is a compile-visible change everywhere it matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionKind {
    /// Run a command through the script-runner capability
    Script {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// Build a container image
    ImageBuild {
        dockerfile: String,
        context: String,
        tag: String,
    },
    /// Apply a manifest to a deploy target
    Deploy { target: String, manifest: String },
    /// Run a named test suite
    TestSuite { suite: String, fail_fast: bool },
    /// Emit a message on a channel
    Notify { channel: String, message: String },
}

/// Retry behavior for a stage's action list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub backoff_multiplier: f64,
    pub max_delay_secs: u64,
    /// Error classes worth retrying; empty means any class
    pub retry_on: Vec<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            initial_delay_secs: 5,
            backoff_multiplier: 2.0,
            max_delay_secs: 300,
            retry_on: Vec::new(),
        }
    }
}

/// Failure classification used to gate retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Transient,
    Timeout,
    Infrastructure,
    Any,
}

/// Manual approval gate configuration
///
/// Invariant: `required <= approvers.len()`; the registry rejects
/// configurations that violate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub id: Uuid,
    pub approvers: Vec<String>,
    pub required: u32,
    pub timeout_secs: u64,
}

impl ApprovalConfig {
    pub fn new(approvers: Vec<String>, required: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            approvers,
            required,
            timeout_secs: 86_400,
        }
    }
}
