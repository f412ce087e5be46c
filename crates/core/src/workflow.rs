//! Workflow transition logic for justifications and their approval tasks.
//!
//! `apply_action` is a pure function over the current aggregate state: it
//! performs no I/O and returns the full post-transition state, so the same
//! inputs always yield the same outcome and callers can replay transitions
//! against the audit trail. The persistence layer commits an outcome as one
//! atomic unit conditioned on the task's `state_version`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::justification::{Justification, JustificationStatus};
use crate::domain::plan::Plan;
use crate::domain::task::{ApprovalTask, TaskStatus};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TaskAction {
    Approve,
    Reject { comment: String },
    RequestInfo { reason: String },
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject { .. } => "reject",
            Self::RequestInfo { .. } => "request_info",
        }
    }
}

/// Full post-transition state for one actor action, ready to commit.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    pub justification: Justification,
    pub resolved_task: ApprovalTask,
    pub next_task: Option<ApprovalTask>,
    pub current_step: u32,
}

/// Apply an approver action to the pending task of the current step.
///
/// Guards, in order: the task must be pending and belong to the live plan
/// version (stale or duplicate deliveries surface `TaskAlreadyResolved` and
/// change nothing); the justification must still be in review; the actor
/// must be in the step's approver set. First valid response wins — the step
/// never waits for the rest of the group.
pub fn apply_action(
    justification: &Justification,
    plan: &Plan,
    task: &ApprovalTask,
    actor: &str,
    action: &TaskAction,
) -> Result<TransitionOutcome, DomainError> {
    if !task.is_pending() || task.plan_version != justification.plan_version {
        return Err(DomainError::TaskAlreadyResolved { task_id: task.id.0.clone() });
    }
    if justification.status != JustificationStatus::InReview {
        return Err(DomainError::TaskAlreadyResolved { task_id: task.id.0.clone() });
    }
    if !task.is_addressed_to(actor) {
        return Err(DomainError::NotAuthorized { actor: actor.to_string() });
    }

    let now = Utc::now();
    let mut resolved = task.clone();
    resolved.resolved_by = Some(actor.to_string());
    resolved.state_version += 1;
    resolved.updated_at = now;
    resolved.resolved_at = Some(now);

    let mut updated = justification.clone();
    updated.updated_at = now;

    let (next_task, current_step) = match action {
        TaskAction::Approve => {
            resolved.status = TaskStatus::Approved;
            match plan.step(task.step_index + 1) {
                Some(step) => {
                    let next = ApprovalTask::pending(updated.id.clone(), plan.version, step);
                    (Some(next), step.index)
                }
                None => {
                    updated.transition_to(JustificationStatus::Approved)?;
                    (None, task.step_index)
                }
            }
        }
        TaskAction::Reject { comment } => {
            if comment.trim().is_empty() {
                return Err(DomainError::CommentRequired { action: "reject" });
            }
            resolved.status = TaskStatus::Rejected;
            resolved.comment = Some(comment.clone());
            updated.transition_to(JustificationStatus::Rejected)?;
            (None, task.step_index)
        }
        TaskAction::RequestInfo { reason } => {
            if reason.trim().is_empty() {
                return Err(DomainError::CommentRequired { action: "request information" });
            }
            resolved.status = TaskStatus::InfoRequested;
            resolved.comment = Some(reason.clone());
            updated.transition_to(JustificationStatus::NeedsInfo)?;
            (None, task.step_index)
        }
    };

    Ok(TransitionOutcome { justification: updated, resolved_task: resolved, next_task, current_step })
}
