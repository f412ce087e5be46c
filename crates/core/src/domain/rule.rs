use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Matches any department or type code when used in a rule.
pub const WILDCARD: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// Administrator-managed routing configuration. In-flight plans snapshot the
/// rule at match time, so edits never affect justifications already routed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: RuleId,
    pub name: String,
    pub department: String,
    pub type_code: String,
    pub spend_threshold: Decimal,
    pub steps: Vec<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rule creation payload. `approver_emails` is the flat single-step form the
/// original intake surface posts; `steps` is the full multi-step form. When
/// both are present `steps` wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default = "wildcard")]
    pub department: String,
    #[serde(default = "wildcard")]
    pub type_code: String,
    #[serde(default)]
    pub spend_threshold: Decimal,
    #[serde(default)]
    pub steps: Vec<Vec<String>>,
    #[serde(default)]
    pub approver_emails: Vec<String>,
}

fn wildcard() -> String {
    WILDCARD.to_string()
}

impl RuleDraft {
    pub fn into_rule(self) -> Result<RoutingRule, DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidRule("name must not be empty".to_string()));
        }
        if self.spend_threshold < Decimal::ZERO {
            return Err(DomainError::InvalidRule(
                "spend_threshold must not be negative".to_string(),
            ));
        }

        let steps = if !self.steps.is_empty() {
            self.steps
        } else if !self.approver_emails.is_empty() {
            vec![self.approver_emails]
        } else {
            return Err(DomainError::InvalidRule(
                "at least one approver step is required".to_string(),
            ));
        };

        for (index, group) in steps.iter().enumerate() {
            if group.is_empty() {
                return Err(DomainError::InvalidRule(format!("step {index} has no approvers")));
            }
            if group.iter().any(|address| address.trim().is_empty()) {
                return Err(DomainError::InvalidRule(format!(
                    "step {index} contains a blank approver address"
                )));
            }
        }

        let department =
            if self.department.trim().is_empty() { wildcard() } else { self.department };
        let type_code = if self.type_code.trim().is_empty() { wildcard() } else { self.type_code };

        let now = Utc::now();
        Ok(RoutingRule {
            id: RuleId(Uuid::new_v4().to_string()),
            name: self.name,
            department,
            type_code,
            spend_threshold: self.spend_threshold,
            steps,
            created_at: now,
            updated_at: now,
        })
    }
}
