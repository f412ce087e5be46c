pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod routing;
pub mod workflow;

pub use chrono;
pub use rust_decimal;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::justification::{
    Justification, JustificationDraft, JustificationId, JustificationStatus, JustificationUpdate,
};
pub use domain::plan::{Plan, PlanStep};
pub use domain::rule::{RoutingRule, RuleDraft, RuleId, WILDCARD};
pub use domain::task::{ApprovalTask, TaskId, TaskStatus};
pub use errors::DomainError;
pub use routing::match_rule;
pub use workflow::{apply_action, TaskAction, TransitionOutcome};
