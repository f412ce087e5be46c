use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::justification::JustificationId;
use crate::domain::rule::RoutingRule;

/// One stage of a plan. The approver set is copied by value from the rule at
/// build time; later rule edits never reach a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: u32,
    pub approvers: Vec<String>,
}

/// The ordered approval steps for one justification instance. The step
/// sequence is immutable once built; resubmission supersedes the whole plan
/// with a new version instead of editing it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub justification_id: JustificationId,
    pub version: u32,
    pub rule_name: String,
    pub steps: Vec<PlanStep>,
    pub current_step: u32,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Expand a matched rule into step snapshots, starting at step 0.
    pub fn from_rule(rule: &RoutingRule, justification_id: JustificationId, version: u32) -> Self {
        let steps = rule
            .steps
            .iter()
            .enumerate()
            .map(|(index, approvers)| PlanStep { index: index as u32, approvers: approvers.clone() })
            .collect();

        Self {
            justification_id,
            version,
            rule_name: rule.name.clone(),
            steps,
            current_step: 0,
            created_at: Utc::now(),
        }
    }

    pub fn step(&self, index: u32) -> Option<&PlanStep> {
        self.steps.get(index as usize)
    }

    pub fn is_last_step(&self, index: u32) -> bool {
        index as usize + 1 >= self.steps.len()
    }
}
