use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::justification::JustificationId;
use crate::domain::plan::PlanStep;
use crate::routing::normalize_key;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Approved,
    Rejected,
    InfoRequested,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InfoRequested => "info_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "info_requested" => Some(Self::InfoRequested),
            _ => None,
        }
    }
}

/// The actionable unit created for an active plan step. Resolved exactly
/// once; `state_version` is the optimistic-concurrency counter every
/// resolution write is conditioned on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalTask {
    pub id: TaskId,
    pub justification_id: JustificationId,
    pub plan_version: u32,
    pub step_index: u32,
    pub approvers: Vec<String>,
    pub status: TaskStatus,
    pub resolved_by: Option<String>,
    pub comment: Option<String>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalTask {
    /// Create the pending task for a step that just became active. The
    /// approver set is the step snapshot, copied again so the task row is
    /// self-contained for inbox queries.
    pub fn pending(justification_id: JustificationId, plan_version: u32, step: &PlanStep) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId(Uuid::new_v4().to_string()),
            justification_id,
            plan_version,
            step_index: step.index,
            approvers: step.approvers.clone(),
            status: TaskStatus::Pending,
            resolved_by: None,
            comment: None,
            state_version: 1,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_addressed_to(&self, actor: &str) -> bool {
        let actor = normalize_key(actor);
        self.approvers.iter().any(|address| normalize_key(address) == actor)
    }
}
