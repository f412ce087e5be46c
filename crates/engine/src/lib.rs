//! Workflow engine facade: the single entry point external collaborators
//! call. Composes rule matching, plan building, and the workflow transition
//! logic from `justifi-core` with the durable store behind the repository
//! traits in `justifi-db`.
//!
//! Every mutating operation is one atomic store commit. Task resolution is
//! linearizable: the commit is conditioned on the task's state version, and
//! a losing writer re-reads once before reporting the task as already
//! resolved (or retrying a benign conflict).

pub mod notify;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use justifi_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use justifi_core::domain::justification::{
    Justification, JustificationDraft, JustificationId, JustificationStatus, JustificationUpdate,
};
use justifi_core::domain::plan::Plan;
use justifi_core::domain::rule::{RoutingRule, RuleDraft};
use justifi_core::domain::task::{ApprovalTask, TaskId};
use justifi_core::errors::DomainError;
use justifi_core::routing::match_rule;
use justifi_core::workflow::{apply_action, TaskAction};
use justifi_db::repositories::{
    JustificationRepository, PlanRepository, RepositoryError, RuleRepository, TaskRepository,
    TransitionCommit, TransitionStore,
};

use crate::notify::{Notifier, TracingNotifier};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("justification not found: {0}")]
    JustificationNotFound(String),
    #[error("persistence failure: {0}")]
    Store(String),
}

impl From<RepositoryError> for EngineError {
    fn from(error: RepositoryError) -> Self {
        Self::Store(error.to_string())
    }
}

/// Inbox projection row: a pending task joined with its parent justification
/// for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InboxEntry {
    pub task: ApprovalTask,
    pub justification: Justification,
}

/// Emits audit events as structured log records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            outcome = ?event.outcome,
            justification_id = event.justification_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            task_id = event.task_id.as_deref().unwrap_or("unknown"),
            "audit event"
        );
    }
}

pub struct WorkflowEngine {
    rules: Arc<dyn RuleRepository>,
    justifications: Arc<dyn JustificationRepository>,
    plans: Arc<dyn PlanRepository>,
    tasks: Arc<dyn TaskRepository>,
    store: Arc<dyn TransitionStore>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    transition_retry_limit: u32,
}

impl WorkflowEngine {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        justifications: Arc<dyn JustificationRepository>,
        plans: Arc<dyn PlanRepository>,
        tasks: Arc<dyn TaskRepository>,
        store: Arc<dyn TransitionStore>,
    ) -> Self {
        Self {
            rules,
            justifications,
            plans,
            tasks,
            store,
            notifier: Arc::new(TracingNotifier),
            audit: Arc::new(TracingAuditSink),
            transition_retry_limit: 1,
        }
    }

    /// Build an engine over one value implementing every store trait, such
    /// as `InMemoryWorkflowStore` or a test double.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: RuleRepository
            + JustificationRepository
            + PlanRepository
            + TaskRepository
            + TransitionStore
            + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store.clone(), store)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_transition_retry_limit(mut self, limit: u32) -> Self {
        self.transition_retry_limit = limit;
        self
    }

    /// Validate a submission, route it, and persist the justification with
    /// plan version 1 and its step-0 pending task. Nothing is persisted when
    /// validation or routing fails.
    pub async fn submit(&self, draft: JustificationDraft) -> Result<Justification, EngineError> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut justification = Justification::submit(draft)?;

        let rules = self.rules.list_all().await?;
        let rule = match match_rule(
            &rules,
            &justification.department,
            &justification.type_code,
            justification.cost_estimate,
        ) {
            Ok(rule) => rule,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        Some(justification.id.clone()),
                        None,
                        correlation_id.as_str(),
                        "justification.routing_failed",
                        AuditCategory::Routing,
                        justification.requester_email.as_str(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        justification.transition_to(JustificationStatus::InReview)?;
        justification.plan_version = 1;
        let plan = Plan::from_rule(rule, justification.id.clone(), 1);
        let step = plan
            .step(0)
            .ok_or_else(|| EngineError::Store("matched rule produced an empty plan".to_string()))?;
        let task = ApprovalTask::pending(justification.id.clone(), plan.version, step);

        self.store.commit_submission(&justification, &plan, &task).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(justification.id.clone()),
                Some(task.id.0.clone()),
                correlation_id.as_str(),
                "justification.submitted",
                AuditCategory::Ingress,
                justification.requester_email.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("rule", plan.rule_name.clone())
            .with_metadata("steps", plan.steps.len().to_string()),
        );
        self.notifier.task_created(&task, &justification);

        info!(
            event_name = "workflow.submission_routed",
            correlation_id = %correlation_id,
            justification_id = %justification.id.0,
            rule = %plan.rule_name,
            "justification routed for approval"
        );

        Ok(justification)
    }

    /// Apply an approver action to a task. Exactly one of any set of
    /// concurrent calls on the same pending task succeeds; the rest observe
    /// `TaskAlreadyResolved`.
    pub async fn act(
        &self,
        task_id: &TaskId,
        actor: &str,
        action: TaskAction,
    ) -> Result<ApprovalTask, EngineError> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut attempts = 0u32;

        loop {
            let Some(task) = self.tasks.find_by_id(task_id).await? else {
                return Err(EngineError::TaskNotFound(task_id.0.clone()));
            };
            let Some(justification) =
                self.justifications.find_by_id(&task.justification_id).await?
            else {
                return Err(EngineError::Store(format!(
                    "justification `{}` missing for task `{}`",
                    task.justification_id.0, task_id.0
                )));
            };
            let Some(plan) = self
                .plans
                .find_by_version(&justification.id, justification.plan_version)
                .await?
            else {
                return Err(EngineError::Store(format!(
                    "plan version {} missing for justification `{}`",
                    justification.plan_version, justification.id.0
                )));
            };

            let outcome = match apply_action(&justification, &plan, &task, actor, &action) {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(justification.id.clone()),
                            Some(task_id.0.clone()),
                            correlation_id.as_str(),
                            "workflow.transition_rejected",
                            AuditCategory::Workflow,
                            actor,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("action", action.as_str())
                        .with_metadata("error", error.to_string()),
                    );
                    return Err(error.into());
                }
            };

            let commit = TransitionCommit {
                justification: outcome.justification.clone(),
                resolved_task: outcome.resolved_task.clone(),
                expected_task_version: task.state_version,
                next_task: outcome.next_task.clone(),
                current_step: outcome.current_step,
            };

            match self.store.commit_transition(&commit).await {
                Ok(()) => {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(justification.id.clone()),
                            Some(task_id.0.clone()),
                            correlation_id.as_str(),
                            "workflow.task_resolved",
                            AuditCategory::Workflow,
                            actor,
                            AuditOutcome::Success,
                        )
                        .with_metadata("action", action.as_str())
                        .with_metadata("step_index", outcome.resolved_task.step_index.to_string())
                        .with_metadata("status", outcome.justification.status.as_str()),
                    );
                    self.notifier.task_resolved(&outcome.resolved_task, &outcome.justification);
                    if let Some(next_task) = &outcome.next_task {
                        self.notifier.task_created(next_task, &outcome.justification);
                    }

                    info!(
                        event_name = "workflow.transition_applied",
                        correlation_id = %correlation_id,
                        justification_id = %justification.id.0,
                        task_id = %task_id.0,
                        action = action.as_str(),
                        status = outcome.justification.status.as_str(),
                        "workflow transition applied"
                    );

                    return Ok(outcome.resolved_task);
                }
                Err(RepositoryError::Conflict) => {
                    if attempts >= self.transition_retry_limit {
                        // The task may have been resolved between the final
                        // read and write; report that precisely.
                        let still_pending = self
                            .tasks
                            .find_by_id(task_id)
                            .await?
                            .map(|task| task.is_pending())
                            .unwrap_or(false);
                        if still_pending {
                            return Err(EngineError::Store(
                                "task transition kept conflicting; retry the action".to_string(),
                            ));
                        }
                        return Err(DomainError::TaskAlreadyResolved {
                            task_id: task_id.0.clone(),
                        }
                        .into());
                    }
                    attempts += 1;
                    warn!(
                        event_name = "workflow.transition_conflict",
                        correlation_id = %correlation_id,
                        task_id = %task_id.0,
                        attempt = attempts,
                        "transition write conflicted; re-reading task"
                    );
                    // Loop re-reads: a meanwhile-resolved task surfaces
                    // TaskAlreadyResolved from the transition guard.
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Resubmit a justification stuck in `NeedsInfo`. Builds a superseding
    /// plan version against the (possibly re-matched) rule; stray pending
    /// tasks of the old version stop being actionable in the same commit.
    pub async fn resubmit(
        &self,
        justification_id: &JustificationId,
        actor: &str,
        update: JustificationUpdate,
    ) -> Result<Justification, EngineError> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut attempts = 0u32;

        loop {
            let Some(current) = self.justifications.find_by_id(justification_id).await? else {
                return Err(EngineError::JustificationNotFound(justification_id.0.clone()));
            };

            if normalize(actor) != normalize(&current.requester_email) {
                return Err(DomainError::NotAuthorized { actor: actor.to_string() }.into());
            }
            if current.status != JustificationStatus::NeedsInfo {
                return Err(DomainError::InvalidStatusTransition {
                    from: current.status,
                    to: JustificationStatus::InReview,
                }
                .into());
            }

            let expected_plan_version = current.plan_version;
            let mut updated = current.clone();
            updated.apply_update(update.clone())?;

            let rules = self.rules.list_all().await?;
            let rule = match match_rule(
                &rules,
                &updated.department,
                &updated.type_code,
                updated.cost_estimate,
            ) {
                Ok(rule) => rule,
                Err(error) => {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(updated.id.clone()),
                            None,
                            correlation_id.as_str(),
                            "justification.routing_failed",
                            AuditCategory::Routing,
                            actor,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("error", error.to_string()),
                    );
                    return Err(error.into());
                }
            };

            updated.transition_to(JustificationStatus::InReview)?;
            updated.plan_version = expected_plan_version + 1;
            let plan = Plan::from_rule(rule, updated.id.clone(), updated.plan_version);
            let step = plan.step(0).ok_or_else(|| {
                EngineError::Store("matched rule produced an empty plan".to_string())
            })?;
            let task = ApprovalTask::pending(updated.id.clone(), plan.version, step);

            match self
                .store
                .commit_resubmission(&updated, expected_plan_version, &plan, &task)
                .await
            {
                Ok(()) => {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(updated.id.clone()),
                            Some(task.id.0.clone()),
                            correlation_id.as_str(),
                            "justification.resubmitted",
                            AuditCategory::Workflow,
                            actor,
                            AuditOutcome::Success,
                        )
                        .with_metadata("plan_version", updated.plan_version.to_string())
                        .with_metadata("rule", plan.rule_name.clone()),
                    );
                    self.notifier.task_created(&task, &updated);

                    info!(
                        event_name = "workflow.resubmission_routed",
                        correlation_id = %correlation_id,
                        justification_id = %updated.id.0,
                        plan_version = updated.plan_version,
                        "resubmission routed for approval"
                    );

                    return Ok(updated);
                }
                Err(RepositoryError::Conflict) => {
                    if attempts >= self.transition_retry_limit {
                        return Err(DomainError::InvalidStatusTransition {
                            from: current.status,
                            to: JustificationStatus::InReview,
                        }
                        .into());
                    }
                    attempts += 1;
                    // Loop re-reads; a concurrent resubmission or state
                    // change fails the status guard on the next pass.
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// All pending tasks addressed to the approver on live plan versions,
    /// joined with their parent justification.
    pub async fn inbox(&self, approver_email: &str) -> Result<Vec<InboxEntry>, EngineError> {
        let tasks = self.tasks.list_actionable_for_approver(approver_email).await?;
        let mut entries = Vec::with_capacity(tasks.len());
        for task in tasks {
            match self.justifications.find_by_id(&task.justification_id).await? {
                Some(justification) => entries.push(InboxEntry { task, justification }),
                None => {
                    warn!(
                        event_name = "workflow.inbox_orphan_task",
                        task_id = %task.id.0,
                        justification_id = %task.justification_id.0,
                        "pending task references a missing justification"
                    );
                }
            }
        }
        Ok(entries)
    }

    pub async fn list_mine(
        &self,
        requester_email: &str,
    ) -> Result<Vec<Justification>, EngineError> {
        Ok(self.justifications.list_by_requester(requester_email).await?)
    }

    pub async fn list_tasks(
        &self,
        justification_id: &JustificationId,
    ) -> Result<Vec<ApprovalTask>, EngineError> {
        Ok(self.tasks.list_for_justification(justification_id).await?)
    }

    /// Validate and upsert a routing rule by name. In-flight plans snapshot
    /// rules at match time and are unaffected.
    pub async fn create_rule(&self, draft: RuleDraft) -> Result<RoutingRule, EngineError> {
        let correlation_id = Uuid::new_v4().to_string();
        let rule = draft.into_rule()?;
        self.rules.save(rule.clone()).await?;
        // Upserts keep the stored identity; re-read so callers see it.
        let rule = self.rules.find_by_name(&rule.name).await?.unwrap_or(rule);

        self.audit.emit(
            AuditEvent::new(
                None,
                None,
                correlation_id.as_str(),
                "routing.rule_saved",
                AuditCategory::Routing,
                "administrator",
                AuditOutcome::Success,
            )
            .with_metadata("rule", rule.name.clone())
            .with_metadata("steps", rule.steps.len().to_string()),
        );

        Ok(rule)
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
