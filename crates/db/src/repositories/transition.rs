use sqlx::{Sqlite, Transaction};

use justifi_core::domain::justification::Justification;
use justifi_core::domain::plan::Plan;
use justifi_core::domain::task::ApprovalTask;

use super::{RepositoryError, TransitionCommit, TransitionStore};
use crate::DbPool;

/// SQL implementation of the atomic commit contract. Every method runs in a
/// single database transaction; the task resolution inside
/// `commit_transition` is a compare-and-swap on (status, state_version).
pub struct SqlTransitionStore {
    pool: DbPool,
}

impl SqlTransitionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn insert_justification(
    tx: &mut Transaction<'_, Sqlite>,
    justification: &Justification,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO justification (id, title, type_code, department, cost_centre,
                                    requester_email, urgency, description, business_impact,
                                    alternatives, cost_estimate, required_date, status,
                                    plan_version, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&justification.id.0)
    .bind(&justification.title)
    .bind(&justification.type_code)
    .bind(&justification.department)
    .bind(&justification.cost_centre)
    .bind(&justification.requester_email)
    .bind(&justification.urgency)
    .bind(&justification.description)
    .bind(&justification.business_impact)
    .bind(&justification.alternatives)
    .bind(justification.cost_estimate.to_string())
    .bind(justification.required_date.map(|date| date.format("%Y-%m-%d").to_string()))
    .bind(justification.status.as_str())
    .bind(i64::from(justification.plan_version))
    .bind(justification.created_at.to_rfc3339())
    .bind(justification.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_plan(
    tx: &mut Transaction<'_, Sqlite>,
    plan: &Plan,
) -> Result<(), RepositoryError> {
    let steps_json = serde_json::to_string(&plan.steps)
        .map_err(|e| RepositoryError::Decode(format!("invalid plan steps: {e}")))?;

    sqlx::query(
        "INSERT INTO approval_plan (justification_id, version, rule_name, steps_json,
                                    current_step, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&plan.justification_id.0)
    .bind(i64::from(plan.version))
    .bind(&plan.rule_name)
    .bind(&steps_json)
    .bind(i64::from(plan.current_step))
    .bind(plan.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_task(
    tx: &mut Transaction<'_, Sqlite>,
    task: &ApprovalTask,
) -> Result<(), RepositoryError> {
    let approvers_json = serde_json::to_string(&task.approvers)
        .map_err(|e| RepositoryError::Decode(format!("invalid task approvers: {e}")))?;

    sqlx::query(
        "INSERT INTO approval_task (id, justification_id, plan_version, step_index,
                                    approvers_json, status, resolved_by, comment,
                                    state_version, created_at, updated_at, resolved_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&task.id.0)
    .bind(&task.justification_id.0)
    .bind(i64::from(task.plan_version))
    .bind(i64::from(task.step_index))
    .bind(&approvers_json)
    .bind(task.status.as_str())
    .bind(task.resolved_by.as_deref())
    .bind(task.comment.as_deref())
    .bind(i64::from(task.state_version))
    .bind(task.created_at.to_rfc3339())
    .bind(task.updated_at.to_rfc3339())
    .bind(task.resolved_at.map(|at| at.to_rfc3339()))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl TransitionStore for SqlTransitionStore {
    async fn commit_submission(
        &self,
        justification: &Justification,
        plan: &Plan,
        task: &ApprovalTask,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_justification(&mut tx, justification).await?;
        insert_plan(&mut tx, plan).await?;
        insert_task(&mut tx, task).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<(), RepositoryError> {
        let resolved = &commit.resolved_task;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE approval_task
             SET status = ?, resolved_by = ?, comment = ?, state_version = ?,
                 updated_at = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending' AND state_version = ?",
        )
        .bind(resolved.status.as_str())
        .bind(resolved.resolved_by.as_deref())
        .bind(resolved.comment.as_deref())
        .bind(i64::from(resolved.state_version))
        .bind(resolved.updated_at.to_rfc3339())
        .bind(resolved.resolved_at.map(|at| at.to_rfc3339()))
        .bind(&resolved.id.0)
        .bind(i64::from(commit.expected_task_version))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict);
        }

        if let Some(next_task) = &commit.next_task {
            insert_task(&mut tx, next_task).await?;
        }

        sqlx::query("UPDATE approval_plan SET current_step = ? WHERE justification_id = ? AND version = ?")
            .bind(i64::from(commit.current_step))
            .bind(&commit.justification.id.0)
            .bind(i64::from(commit.justification.plan_version))
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE justification SET status = ?, updated_at = ? WHERE id = ?")
            .bind(commit.justification.status.as_str())
            .bind(commit.justification.updated_at.to_rfc3339())
            .bind(&commit.justification.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_resubmission(
        &self,
        justification: &Justification,
        expected_plan_version: u32,
        plan: &Plan,
        task: &ApprovalTask,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE justification
             SET title = ?, type_code = ?, department = ?, cost_centre = ?, urgency = ?,
                 description = ?, business_impact = ?, alternatives = ?, cost_estimate = ?,
                 required_date = ?, status = ?, plan_version = ?, updated_at = ?
             WHERE id = ? AND status = 'needs_info' AND plan_version = ?",
        )
        .bind(&justification.title)
        .bind(&justification.type_code)
        .bind(&justification.department)
        .bind(&justification.cost_centre)
        .bind(&justification.urgency)
        .bind(&justification.description)
        .bind(&justification.business_impact)
        .bind(&justification.alternatives)
        .bind(justification.cost_estimate.to_string())
        .bind(justification.required_date.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(justification.status.as_str())
        .bind(i64::from(justification.plan_version))
        .bind(justification.updated_at.to_rfc3339())
        .bind(&justification.id.0)
        .bind(i64::from(expected_plan_version))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict);
        }

        insert_plan(&mut tx, plan).await?;
        insert_task(&mut tx, task).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use justifi_core::domain::justification::{
        Justification, JustificationDraft, JustificationStatus,
    };
    use justifi_core::domain::plan::Plan;
    use justifi_core::domain::rule::RuleDraft;
    use justifi_core::domain::task::{ApprovalTask, TaskStatus};

    use super::SqlTransitionStore;
    use crate::repositories::{
        JustificationRepository, RepositoryError, SqlJustificationRepository, SqlTaskRepository,
        TaskRepository, TransitionCommit, TransitionStore,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn routed_fixture() -> (Justification, Plan, ApprovalTask) {
        let rule = RuleDraft {
            name: "IT Project Default".to_string(),
            department: "IT".to_string(),
            type_code: "PROJECT".to_string(),
            steps: vec![
                vec!["manager@example.com".to_string()],
                vec!["cfo@example.com".to_string()],
            ],
            ..RuleDraft::default()
        }
        .into_rule()
        .expect("valid rule");

        let mut justification = Justification::submit(JustificationDraft {
            title: "New laptops".to_string(),
            type_code: "PROJECT".to_string(),
            department: "IT".to_string(),
            requester_email: "alice@example.com".to_string(),
            cost_estimate: Decimal::new(500, 0),
            ..JustificationDraft::default()
        })
        .expect("valid draft");
        justification.status = JustificationStatus::InReview;
        justification.plan_version = 1;

        let plan = Plan::from_rule(&rule, justification.id.clone(), 1);
        let task =
            ApprovalTask::pending(justification.id.clone(), 1, plan.step(0).expect("step 0"));

        (justification, plan, task)
    }

    fn approval_commit(
        justification: &Justification,
        plan: &Plan,
        task: &ApprovalTask,
    ) -> TransitionCommit {
        let now = Utc::now();
        let mut resolved = task.clone();
        resolved.status = TaskStatus::Approved;
        resolved.resolved_by = Some("manager@example.com".to_string());
        resolved.state_version += 1;
        resolved.updated_at = now;
        resolved.resolved_at = Some(now);

        let next_task = ApprovalTask::pending(
            justification.id.clone(),
            plan.version,
            plan.step(1).expect("step 1"),
        );

        TransitionCommit {
            justification: justification.clone(),
            resolved_task: resolved,
            expected_task_version: task.state_version,
            next_task: Some(next_task),
            current_step: 1,
        }
    }

    #[tokio::test]
    async fn commit_transition_resolves_and_creates_next_task() {
        let pool = setup().await;
        let (justification, plan, task) = routed_fixture();
        let store = SqlTransitionStore::new(pool.clone());
        store.commit_submission(&justification, &plan, &task).await.expect("submission");

        let commit = approval_commit(&justification, &plan, &task);
        store.commit_transition(&commit).await.expect("transition commits");

        let tasks = SqlTaskRepository::new(pool.clone());
        let resolved =
            tasks.find_by_id(&task.id).await.expect("find").expect("should exist");
        assert_eq!(resolved.status, TaskStatus::Approved);
        assert_eq!(resolved.state_version, task.state_version + 1);

        let history = tasks.list_for_justification(&justification.id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].step_index, 1);
        assert_eq!(history[1].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn stale_version_commit_is_rejected_and_persists_nothing() {
        let pool = setup().await;
        let (justification, plan, task) = routed_fixture();
        let store = SqlTransitionStore::new(pool.clone());
        store.commit_submission(&justification, &plan, &task).await.expect("submission");

        let winner = approval_commit(&justification, &plan, &task);
        store.commit_transition(&winner).await.expect("first commit wins");

        let loser = approval_commit(&justification, &plan, &task);
        let error = store.commit_transition(&loser).await.expect_err("stale commit must fail");
        assert!(matches!(error, RepositoryError::Conflict));

        // The losing commit's next task must not have been written.
        let tasks = SqlTaskRepository::new(pool);
        let history = tasks.list_for_justification(&justification.id).await.expect("history");
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn commit_resubmission_supersedes_plan_version() {
        let pool = setup().await;
        let (mut justification, plan, task) = routed_fixture();
        let store = SqlTransitionStore::new(pool.clone());
        store.commit_submission(&justification, &plan, &task).await.expect("submission");

        // Resolve step 0 as info-requested, moving the justification to
        // needs_info, so a resubmission is legal.
        let now = Utc::now();
        let mut resolved = task.clone();
        resolved.status = TaskStatus::InfoRequested;
        resolved.resolved_by = Some("manager@example.com".to_string());
        resolved.comment = Some("need vendor quote".to_string());
        resolved.state_version += 1;
        resolved.updated_at = now;
        resolved.resolved_at = Some(now);
        let mut needs_info = justification.clone();
        needs_info.status = JustificationStatus::NeedsInfo;
        store
            .commit_transition(&TransitionCommit {
                justification: needs_info,
                resolved_task: resolved,
                expected_task_version: task.state_version,
                next_task: None,
                current_step: 0,
            })
            .await
            .expect("info request commits");

        justification.status = JustificationStatus::InReview;
        justification.plan_version = 2;
        justification.description = "added vendor quote".to_string();
        let new_plan = Plan { version: 2, ..plan.clone() };
        let new_task =
            ApprovalTask::pending(justification.id.clone(), 2, new_plan.step(0).expect("step 0"));

        store
            .commit_resubmission(&justification, 1, &new_plan, &new_task)
            .await
            .expect("resubmission commits");

        let stored = SqlJustificationRepository::new(pool.clone())
            .find_by_id(&justification.id)
            .await
            .expect("find")
            .expect("should exist");
        assert_eq!(stored.plan_version, 2);
        assert_eq!(stored.status, JustificationStatus::InReview);
        assert_eq!(stored.description, "added vendor quote");

        // Replaying the same resubmission against the superseded version
        // must conflict.
        let error = store
            .commit_resubmission(&justification, 1, &new_plan, &new_task)
            .await
            .expect_err("duplicate resubmission must fail");
        assert!(matches!(error, RepositoryError::Conflict));
    }
}
