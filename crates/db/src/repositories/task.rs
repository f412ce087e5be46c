use chrono::{DateTime, Utc};
use sqlx::Row;

use justifi_core::domain::justification::JustificationId;
use justifi_core::domain::task::{ApprovalTask, TaskId, TaskStatus};

use super::{RepositoryError, TaskRepository};
use crate::DbPool;

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) const TASK_COLUMNS: &str = "id, justification_id, plan_version, step_index, \
     approvers_json, status, resolved_by, comment, state_version, created_at, updated_at, \
     resolved_at";

pub(crate) fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalTask, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let justification_id: String =
        row.try_get("justification_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let plan_version: i64 =
        row.try_get("plan_version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let step_index: i64 =
        row.try_get("step_index").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approvers_json: String =
        row.try_get("approvers_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_by: Option<String> =
        row.try_get("resolved_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: Option<String> =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_version: i64 =
        row.try_get("state_version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_at_str: Option<String> =
        row.try_get("resolved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let approvers: Vec<String> = serde_json::from_str(&approvers_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid approvers_json: {e}")))?;
    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task status `{status_str}`")))?;
    let resolved_at = resolved_at_str.map(|raw| parse_timestamp("resolved_at", &raw)).transpose()?;

    Ok(ApprovalTask {
        id: TaskId(id),
        justification_id: JustificationId(justification_id),
        plan_version: plan_version as u32,
        step_index: step_index as u32,
        approvers,
        status,
        resolved_by,
        comment,
        state_version: state_version as u32,
        created_at: parse_timestamp("created_at", &created_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
        resolved_at,
    })
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid {field} `{raw}`: {e}")))
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<ApprovalTask>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM approval_task WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_for_justification(
        &self,
        justification_id: &JustificationId,
    ) -> Result<Vec<ApprovalTask>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM approval_task
             WHERE justification_id = ?
             ORDER BY plan_version ASC, step_index ASC, created_at ASC"
        ))
        .bind(&justification_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn list_actionable_for_approver(
        &self,
        approver_email: &str,
    ) -> Result<Vec<ApprovalTask>, RepositoryError> {
        // Tasks left behind by a superseded plan version are excluded by the
        // join condition, not by rewriting their status.
        let rows = sqlx::query(
            "SELECT t.id, t.justification_id, t.plan_version, t.step_index, t.approvers_json,
                    t.status, t.resolved_by, t.comment, t.state_version, t.created_at,
                    t.updated_at, t.resolved_at
             FROM approval_task t
             JOIN justification j
               ON j.id = t.justification_id AND j.plan_version = t.plan_version
             WHERE t.status = 'pending'
               AND EXISTS (
                   SELECT 1 FROM json_each(t.approvers_json)
                   WHERE LOWER(TRIM(json_each.value)) = LOWER(TRIM(?))
               )
             ORDER BY t.created_at ASC",
        )
        .bind(approver_email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }
}
