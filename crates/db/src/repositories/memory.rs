use std::collections::HashMap;

use tokio::sync::RwLock;

use justifi_core::domain::justification::{Justification, JustificationId};
use justifi_core::domain::plan::Plan;
use justifi_core::domain::rule::RoutingRule;
use justifi_core::domain::task::{ApprovalTask, TaskId, TaskStatus};

use super::{
    JustificationRepository, PlanRepository, RepositoryError, RuleRepository, TaskRepository,
    TransitionCommit, TransitionStore,
};

#[derive(Default)]
struct State {
    rules: HashMap<String, RoutingRule>,
    justifications: HashMap<String, Justification>,
    plans: HashMap<(String, u32), Plan>,
    tasks: HashMap<String, ApprovalTask>,
}

/// Store backed by process memory, for tests and ephemeral deployments. One
/// lock guards all aggregates, so every commit is atomic and task
/// resolutions are linearizable exactly as with the SQL store.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<State>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryWorkflowStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<RoutingRule>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.rules.get(name).cloned())
    }

    async fn list_all(&self) -> Result<Vec<RoutingRule>, RepositoryError> {
        let state = self.state.read().await;
        let mut rules: Vec<RoutingRule> = state.rules.values().cloned().collect();
        rules.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(rules)
    }

    async fn save(&self, rule: RoutingRule) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.rules.get(&rule.name) {
            let mut replacement = rule;
            replacement.id = existing.id.clone();
            replacement.created_at = existing.created_at;
            state.rules.insert(replacement.name.clone(), replacement);
        } else {
            state.rules.insert(rule.name.clone(), rule);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl JustificationRepository for InMemoryWorkflowStore {
    async fn find_by_id(
        &self,
        id: &JustificationId,
    ) -> Result<Option<Justification>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.justifications.get(&id.0).cloned())
    }

    async fn list_by_requester(
        &self,
        requester_email: &str,
    ) -> Result<Vec<Justification>, RepositoryError> {
        let requester = requester_email.trim().to_ascii_lowercase();
        let state = self.state.read().await;
        let mut mine: Vec<Justification> = state
            .justifications
            .values()
            .filter(|j| j.requester_email.trim().to_ascii_lowercase() == requester)
            .cloned()
            .collect();
        mine.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(mine)
    }
}

#[async_trait::async_trait]
impl PlanRepository for InMemoryWorkflowStore {
    async fn find_by_version(
        &self,
        justification_id: &JustificationId,
        version: u32,
    ) -> Result<Option<Plan>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.plans.get(&(justification_id.0.clone(), version)).cloned())
    }
}

#[async_trait::async_trait]
impl TaskRepository for InMemoryWorkflowStore {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<ApprovalTask>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.tasks.get(&id.0).cloned())
    }

    async fn list_for_justification(
        &self,
        justification_id: &JustificationId,
    ) -> Result<Vec<ApprovalTask>, RepositoryError> {
        let state = self.state.read().await;
        let mut tasks: Vec<ApprovalTask> = state
            .tasks
            .values()
            .filter(|task| task.justification_id == *justification_id)
            .cloned()
            .collect();
        tasks.sort_by(|left, right| {
            left.plan_version
                .cmp(&right.plan_version)
                .then_with(|| left.step_index.cmp(&right.step_index))
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        Ok(tasks)
    }

    async fn list_actionable_for_approver(
        &self,
        approver_email: &str,
    ) -> Result<Vec<ApprovalTask>, RepositoryError> {
        let state = self.state.read().await;
        let mut actionable: Vec<ApprovalTask> = state
            .tasks
            .values()
            .filter(|task| task.is_pending() && task.is_addressed_to(approver_email))
            .filter(|task| {
                state
                    .justifications
                    .get(&task.justification_id.0)
                    .is_some_and(|j| j.plan_version == task.plan_version)
            })
            .cloned()
            .collect();
        actionable.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(actionable)
    }
}

#[async_trait::async_trait]
impl TransitionStore for InMemoryWorkflowStore {
    async fn commit_submission(
        &self,
        justification: &Justification,
        plan: &Plan,
        task: &ApprovalTask,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.justifications.insert(justification.id.0.clone(), justification.clone());
        state.plans.insert((plan.justification_id.0.clone(), plan.version), plan.clone());
        state.tasks.insert(task.id.0.clone(), task.clone());
        Ok(())
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;

        let stored = state.tasks.get(&commit.resolved_task.id.0);
        let still_expected = stored.is_some_and(|task| {
            task.status == TaskStatus::Pending && task.state_version == commit.expected_task_version
        });
        if !still_expected {
            return Err(RepositoryError::Conflict);
        }

        state.tasks.insert(commit.resolved_task.id.0.clone(), commit.resolved_task.clone());
        if let Some(next_task) = &commit.next_task {
            state.tasks.insert(next_task.id.0.clone(), next_task.clone());
        }
        if let Some(plan) = state
            .plans
            .get_mut(&(commit.justification.id.0.clone(), commit.justification.plan_version))
        {
            plan.current_step = commit.current_step;
        }
        state
            .justifications
            .insert(commit.justification.id.0.clone(), commit.justification.clone());
        Ok(())
    }

    async fn commit_resubmission(
        &self,
        justification: &Justification,
        expected_plan_version: u32,
        plan: &Plan,
        task: &ApprovalTask,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;

        let stored = state.justifications.get(&justification.id.0);
        let still_expected = stored.is_some_and(|j| {
            j.status == justifi_core::domain::justification::JustificationStatus::NeedsInfo
                && j.plan_version == expected_plan_version
        });
        if !still_expected {
            return Err(RepositoryError::Conflict);
        }

        state.justifications.insert(justification.id.0.clone(), justification.clone());
        state.plans.insert((plan.justification_id.0.clone(), plan.version), plan.clone());
        state.tasks.insert(task.id.0.clone(), task.clone());
        Ok(())
    }
}
