use chrono::{DateTime, Utc};
use sqlx::Row;

use justifi_core::domain::justification::JustificationId;
use justifi_core::domain::plan::{Plan, PlanStep};

use super::{PlanRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPlanRepository {
    pool: DbPool,
}

impl SqlPlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> Result<Plan, RepositoryError> {
    let justification_id: String =
        row.try_get("justification_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rule_name: String =
        row.try_get("rule_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let steps_json: String =
        row.try_get("steps_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_step: i64 =
        row.try_get("current_step").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let steps: Vec<PlanStep> = serde_json::from_str(&steps_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid steps_json: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid created_at `{created_at_str}`: {e}")))?;

    Ok(Plan {
        justification_id: JustificationId(justification_id),
        version: version as u32,
        rule_name,
        steps,
        current_step: current_step as u32,
        created_at,
    })
}

#[async_trait::async_trait]
impl PlanRepository for SqlPlanRepository {
    async fn find_by_version(
        &self,
        justification_id: &JustificationId,
        version: u32,
    ) -> Result<Option<Plan>, RepositoryError> {
        let row = sqlx::query(
            "SELECT justification_id, version, rule_name, steps_json, current_step, created_at
             FROM approval_plan
             WHERE justification_id = ? AND version = ?",
        )
        .bind(&justification_id.0)
        .bind(i64::from(version))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_plan).transpose()
    }
}
