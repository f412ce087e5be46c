use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use justifi_core::domain::justification::{Justification, JustificationId, JustificationStatus};

use super::{JustificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlJustificationRepository {
    pool: DbPool,
}

impl SqlJustificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const JUSTIFICATION_COLUMNS: &str = "id, title, type_code, department, cost_centre, \
     requester_email, urgency, description, business_impact, alternatives, cost_estimate, \
     required_date, status, plan_version, created_at, updated_at";

pub(crate) fn row_to_justification(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Justification, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let type_code: String =
        row.try_get("type_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: String =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cost_centre: String =
        row.try_get("cost_centre").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requester_email: String =
        row.try_get("requester_email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let urgency: String =
        row.try_get("urgency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let business_impact: String =
        row.try_get("business_impact").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let alternatives: String =
        row.try_get("alternatives").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cost_estimate_str: String =
        row.try_get("cost_estimate").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required_date_str: Option<String> =
        row.try_get("required_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let plan_version: i64 =
        row.try_get("plan_version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let cost_estimate = Decimal::from_str(&cost_estimate_str).map_err(|e| {
        RepositoryError::Decode(format!("invalid cost_estimate `{cost_estimate_str}`: {e}"))
    })?;
    let required_date = required_date_str
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| RepositoryError::Decode(format!("invalid required_date `{raw}`: {e}")))
        })
        .transpose()?;
    let status = JustificationStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_str}`")))?;

    Ok(Justification {
        id: JustificationId(id),
        title,
        type_code,
        department,
        cost_centre,
        requester_email,
        urgency,
        description,
        business_impact,
        alternatives,
        cost_estimate,
        required_date,
        status,
        plan_version: plan_version as u32,
        created_at: parse_timestamp("created_at", &created_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    })
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid {field} `{raw}`: {e}")))
}

#[async_trait::async_trait]
impl JustificationRepository for SqlJustificationRepository {
    async fn find_by_id(
        &self,
        id: &JustificationId,
    ) -> Result<Option<Justification>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {JUSTIFICATION_COLUMNS} FROM justification WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_justification).transpose()
    }

    async fn list_by_requester(
        &self,
        requester_email: &str,
    ) -> Result<Vec<Justification>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JUSTIFICATION_COLUMNS} FROM justification
             WHERE LOWER(TRIM(requester_email)) = LOWER(TRIM(?))
             ORDER BY created_at DESC"
        ))
        .bind(requester_email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_justification).collect()
    }
}
