use async_trait::async_trait;
use thiserror::Error;

use justifi_core::domain::justification::{Justification, JustificationId};
use justifi_core::domain::plan::Plan;
use justifi_core::domain::rule::RoutingRule;
use justifi_core::domain::task::{ApprovalTask, TaskId};

pub mod justification;
pub mod memory;
pub mod plan;
pub mod rule;
pub mod task;
pub mod transition;

pub use justification::SqlJustificationRepository;
pub use memory::InMemoryWorkflowStore;
pub use plan::SqlPlanRepository;
pub use rule::SqlRuleRepository;
pub use task::SqlTaskRepository;
pub use transition::SqlTransitionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// A conditioned write found the record changed since it was read.
    #[error("write conflict")]
    Conflict,
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<RoutingRule>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<RoutingRule>, RepositoryError>;
    /// Upsert by rule name. In-flight plans are snapshots, so replacing a
    /// rule never reaches justifications already routed by it.
    async fn save(&self, rule: RoutingRule) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait JustificationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &JustificationId,
    ) -> Result<Option<Justification>, RepositoryError>;
    async fn list_by_requester(
        &self,
        requester_email: &str,
    ) -> Result<Vec<Justification>, RepositoryError>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_by_version(
        &self,
        justification_id: &JustificationId,
        version: u32,
    ) -> Result<Option<Plan>, RepositoryError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<ApprovalTask>, RepositoryError>;
    async fn list_for_justification(
        &self,
        justification_id: &JustificationId,
    ) -> Result<Vec<ApprovalTask>, RepositoryError>;
    /// Inbox projection: pending tasks on the live plan version whose step
    /// approver set contains the address (case/whitespace-insensitive).
    async fn list_actionable_for_approver(
        &self,
        approver_email: &str,
    ) -> Result<Vec<ApprovalTask>, RepositoryError>;
}

/// Everything one actor action changes, committed as a single unit. The task
/// resolution is conditioned on `expected_task_version`; a mismatch fails the
/// whole commit with [`RepositoryError::Conflict`] and persists nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionCommit {
    pub justification: Justification,
    pub resolved_task: ApprovalTask,
    pub expected_task_version: u32,
    pub next_task: Option<ApprovalTask>,
    pub current_step: u32,
}

/// Atomic write surface of the workflow engine. Reads go through the
/// per-aggregate repositories; every state mutation goes through one of
/// these commits so no partial transition is ever persisted.
#[async_trait]
pub trait TransitionStore: Send + Sync {
    /// Persist a routed submission: justification, plan version 1, and the
    /// step-0 pending task.
    async fn commit_submission(
        &self,
        justification: &Justification,
        plan: &Plan,
        task: &ApprovalTask,
    ) -> Result<(), RepositoryError>;

    /// Resolve a pending task and apply the resulting justification/plan
    /// advancement, conditioned on the task's state version.
    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<(), RepositoryError>;

    /// Persist a resubmission: updated justification fields, the superseding
    /// plan version, and its step-0 pending task. Conditioned on the
    /// justification still awaiting information at `expected_plan_version`.
    async fn commit_resubmission(
        &self,
        justification: &Justification,
        expected_plan_version: u32,
        plan: &Plan,
        task: &ApprovalTask,
    ) -> Result<(), RepositoryError>;
}
