use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use justifi_core::domain::rule::{RoutingRule, RuleId};

use super::{RepositoryError, RuleRepository};
use crate::DbPool;

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const RULE_COLUMNS: &str =
    "id, name, department, type_code, spend_threshold, steps_json, created_at, updated_at";

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<RoutingRule, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: String =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let type_code: String =
        row.try_get("type_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let spend_threshold_str: String =
        row.try_get("spend_threshold").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let steps_json: String =
        row.try_get("steps_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let spend_threshold = Decimal::from_str(&spend_threshold_str).map_err(|e| {
        RepositoryError::Decode(format!("invalid spend_threshold `{spend_threshold_str}`: {e}"))
    })?;
    let steps: Vec<Vec<String>> = serde_json::from_str(&steps_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid steps_json: {e}")))?;

    Ok(RoutingRule {
        id: RuleId(id),
        name,
        department,
        type_code,
        spend_threshold,
        steps,
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
impl RuleRepository for SqlRuleRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<RoutingRule>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM routing_rule WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_rule).transpose()
    }

    async fn list_all(&self) -> Result<Vec<RoutingRule>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM routing_rule ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn save(&self, rule: RoutingRule) -> Result<(), RepositoryError> {
        let steps_json = serde_json::to_string(&rule.steps)
            .map_err(|e| RepositoryError::Decode(format!("invalid rule steps: {e}")))?;

        sqlx::query(
            "INSERT INTO routing_rule (id, name, department, type_code, spend_threshold,
                                       steps_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 department = excluded.department,
                 type_code = excluded.type_code,
                 spend_threshold = excluded.spend_threshold,
                 steps_json = excluded.steps_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(&rule.department)
        .bind(&rule.type_code)
        .bind(rule.spend_threshold.to_string())
        .bind(&steps_json)
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
