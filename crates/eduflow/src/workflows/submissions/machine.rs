use super::domain::{
    Principal, SchoolPlacement, SubmissionRecord, SubmissionStatus, TransitionAction,
};
use super::scope;
use super::validation::ValidationReport;

/// Inputs the decision kernel needs to judge one transition attempt.
#[derive(Debug)]
pub struct TransitionContext<'a> {
    pub actor: &'a Principal,
    pub placement: &'a SchoolPlacement,
    pub record: &'a SubmissionRecord,
    pub action: TransitionAction,
    pub reason: Option<&'a str>,
    /// Current validation report; required for `Submit`, ignored otherwise.
    pub validation: Option<&'a ValidationReport>,
}

/// Decision produced by [`plan`]. `AlreadyApplied` is the idempotent path:
/// success with no store write and no notification.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionPlan {
    Apply {
        from: SubmissionStatus,
        to: SubmissionStatus,
        reason: Option<String>,
        clear_rejection_reason: bool,
    },
    AlreadyApplied { status: SubmissionStatus },
}

/// Guard failures for a single transition attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },
    #[error("cannot {action} a submission in status '{from}'")]
    IllegalTransition {
        from: SubmissionStatus,
        action: TransitionAction,
    },
    #[error("a rejection requires a non-empty reason")]
    MissingReason,
    #[error("validation failed with {} error(s)", .0.errors.len())]
    ValidationFailed(ValidationReport),
}

/// Pure decision kernel for the approval lifecycle. Guard order: permission,
/// idempotent no-op, state admissibility, then action-specific guards. The
/// caller executes the returned plan against the store.
pub fn plan(ctx: &TransitionContext<'_>) -> Result<TransitionPlan, TransitionError> {
    scope::can_act(ctx.actor, ctx.placement, ctx.action).map_err(|denial| {
        TransitionError::PermissionDenied {
            reason: denial.reason,
        }
    })?;

    let from = ctx.record.status;
    let to = ctx.action.target_status();

    // Retries land here: the target status doubles as the idempotency check.
    if from == to {
        return Ok(TransitionPlan::AlreadyApplied { status: from });
    }

    match (from, ctx.action) {
        (SubmissionStatus::Draft | SubmissionStatus::Rejected, TransitionAction::Submit) => {
            let report = ctx.validation.cloned().unwrap_or_default();
            if !report.is_clean() {
                return Err(TransitionError::ValidationFailed(report));
            }
            Ok(TransitionPlan::Apply {
                from,
                to,
                reason: None,
                clear_rejection_reason: from == SubmissionStatus::Rejected,
            })
        }
        (SubmissionStatus::Pending, TransitionAction::Approve) => Ok(TransitionPlan::Apply {
            from,
            to,
            reason: None,
            clear_rejection_reason: false,
        }),
        (SubmissionStatus::Pending, TransitionAction::Reject) => {
            let reason = ctx.reason.map(str::trim).unwrap_or_default();
            if reason.is_empty() {
                return Err(TransitionError::MissingReason);
            }
            Ok(TransitionPlan::Apply {
                from,
                to,
                reason: Some(reason.to_string()),
                clear_rejection_reason: false,
            })
        }
        (SubmissionStatus::Approved, TransitionAction::Reopen) => Ok(TransitionPlan::Apply {
            from,
            to,
            reason: None,
            clear_rejection_reason: true,
        }),
        (from, action) => Err(TransitionError::IllegalTransition { from, action }),
    }
}
