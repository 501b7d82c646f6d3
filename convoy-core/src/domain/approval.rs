//! Approval domain types

use serde::{Deserialize, Serialize};

/// One approver's decision on a stage's approval gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub approver: String,
    pub decision: ApprovalDecision,
    pub comment: Option<String>,
    pub decided_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ApprovalResult {
    /// A request awaiting the named approver's decision
    pub fn pending(approver: impl Into<String>) -> Self {
        Self {
            approver: approver.into(),
            decision: ApprovalDecision::Pending,
            comment: None,
            decided_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Rejected,
}
