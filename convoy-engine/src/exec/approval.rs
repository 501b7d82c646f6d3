//! Approval coordinator
//!
//! Tracks pending/approved/rejected approval requests on a stage run and
//! decides when the stage may proceed. Submission itself goes through the
//! engine (`Engine::submit_approval`), which records the decision and
//! dispatches the resume event; the arithmetic lives here.

use chrono::Utc;

use convoy_core::domain::approval::{ApprovalDecision, ApprovalResult};
use convoy_core::domain::log::LogLevel;
use convoy_core::domain::run::StageRun;
use convoy_core::domain::stage::{ApprovalConfig, PipelineStage};

/// Outcome of the approval gate for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalGate {
    /// Every config has quorum; actions may run
    Proceed,
    /// Quorum still reachable but not yet met
    Wait,
    /// Enough rejections that quorum can no longer be met
    Rejected,
}

/// Materializes a pending request for every configured approver who has
/// not yet responded
pub fn ensure_pending(config: &ApprovalConfig, stage_run: &mut StageRun) {
    for approver in &config.approvers {
        let known = stage_run
            .approvals
            .iter()
            .any(|r| &r.approver == approver);
        if !known {
            stage_run.approvals.push(ApprovalResult::pending(approver));
        }
    }
}

/// Evaluates every approval config on the stage against recorded decisions
pub fn gate(stage: &PipelineStage, stage_run: &StageRun) -> ApprovalGate {
    let mut verdict = ApprovalGate::Proceed;

    for config in &stage.approvals {
        let approved = count(config, stage_run, ApprovalDecision::Approved);
        let rejected = count(config, stage_run, ApprovalDecision::Rejected);

        if approved >= config.required {
            continue;
        }
        // Quorum is unreachable once too many listed approvers rejected.
        let headroom = config.approvers.len() as u32 - config.required;
        if rejected > headroom {
            return ApprovalGate::Rejected;
        }
        verdict = ApprovalGate::Wait;
    }

    verdict
}

/// Records one approver's decision on the stage run
///
/// Returns false when no pending request exists for the approver: a
/// decision that was already made cannot be silently overwritten.
pub fn record_decision(
    stage_run: &mut StageRun,
    approver: &str,
    approved: bool,
    comment: Option<String>,
) -> bool {
    let Some(result) = stage_run
        .approvals
        .iter_mut()
        .find(|r| r.approver == approver && r.decision == ApprovalDecision::Pending)
    else {
        return false;
    };

    result.decision = if approved {
        ApprovalDecision::Approved
    } else {
        ApprovalDecision::Rejected
    };
    result.comment = comment;
    result.decided_at = Some(Utc::now());

    let verdict = if approved { "approved" } else { "rejected" };
    stage_run.log(LogLevel::Info, format!("{approver} {verdict} the stage"));
    true
}

fn count(config: &ApprovalConfig, stage_run: &StageRun, decision: ApprovalDecision) -> u32 {
    stage_run
        .approvals
        .iter()
        .filter(|r| r.decision == decision && config.approvers.contains(&r.approver))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::domain::stage::StageType;

    fn approval_stage(approvers: &[&str], required: u32) -> (PipelineStage, StageRun) {
        let mut stage = PipelineStage::new("gate", StageType::ManualApproval, 4);
        stage.approvals.push(ApprovalConfig::new(
            approvers.iter().map(|s| s.to_string()).collect(),
            required,
        ));
        let mut stage_run = StageRun::new(&stage);
        for config in &stage.approvals {
            ensure_pending(config, &mut stage_run);
        }
        (stage, stage_run)
    }

    #[test]
    fn test_ensure_pending_is_idempotent() {
        let (stage, mut stage_run) = approval_stage(&["alice", "bob"], 1);
        for config in &stage.approvals {
            ensure_pending(config, &mut stage_run);
        }
        assert_eq!(stage_run.approvals.len(), 2);
    }

    #[test]
    fn test_gate_waits_without_quorum() {
        let (stage, stage_run) = approval_stage(&["alice", "bob"], 2);
        assert_eq!(gate(&stage, &stage_run), ApprovalGate::Wait);
    }

    #[test]
    fn test_gate_proceeds_at_quorum() {
        let (stage, mut stage_run) = approval_stage(&["alice", "bob"], 2);
        assert!(record_decision(&mut stage_run, "alice", true, None));
        assert_eq!(gate(&stage, &stage_run), ApprovalGate::Wait);
        assert!(record_decision(&mut stage_run, "bob", true, None));
        assert_eq!(gate(&stage, &stage_run), ApprovalGate::Proceed);
    }

    #[test]
    fn test_gate_rejects_when_quorum_unreachable() {
        // Two of three must approve; two rejections make that impossible.
        let (stage, mut stage_run) = approval_stage(&["alice", "bob", "carol"], 2);
        assert!(record_decision(&mut stage_run, "alice", false, None));
        assert_eq!(gate(&stage, &stage_run), ApprovalGate::Wait);
        assert!(record_decision(&mut stage_run, "bob", false, None));
        assert_eq!(gate(&stage, &stage_run), ApprovalGate::Rejected);
    }

    #[test]
    fn test_double_decision_is_refused() {
        let (_, mut stage_run) = approval_stage(&["alice"], 1);
        assert!(record_decision(&mut stage_run, "alice", true, None));
        assert!(!record_decision(&mut stage_run, "alice", false, None));
        assert_eq!(
            stage_run.approvals[0].decision,
            ApprovalDecision::Approved
        );
    }

    #[test]
    fn test_unknown_approver_is_refused() {
        let (_, mut stage_run) = approval_stage(&["alice"], 1);
        assert!(!record_decision(&mut stage_run, "mallory", true, None));
    }
}
