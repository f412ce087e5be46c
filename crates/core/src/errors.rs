use thiserror::Error;

use crate::domain::justification::JustificationStatus;

/// Refusals produced by domain validation and workflow transition logic.
/// Persistence and transport layers wrap these rather than redefining them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid justification: {0}")]
    InvalidJustification(String),
    #[error("invalid routing rule: {0}")]
    InvalidRule(String),
    #[error("no routing rule matches department `{department}` and type `{type_code}`")]
    NoRoutingRule { department: String, type_code: String },
    #[error("actor `{actor}` is not permitted to perform this action")]
    NotAuthorized { actor: String },
    #[error("task `{task_id}` is already resolved")]
    TaskAlreadyResolved { task_id: String },
    #[error("a comment is required to {action}")]
    CommentRequired { action: &'static str },
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: JustificationStatus, to: JustificationStatus },
}
