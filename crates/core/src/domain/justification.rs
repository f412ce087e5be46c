use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JustificationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JustificationStatus {
    Submitted,
    InReview,
    NeedsInfo,
    Approved,
    Rejected,
}

impl JustificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InReview => "in_review",
            Self::NeedsInfo => "needs_info",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "in_review" => Some(Self::InReview),
            "needs_info" => Some(Self::NeedsInfo),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Submission payload as entered by the requester. Validation happens on
/// `Justification::submit`, not on deserialization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JustificationDraft {
    pub title: String,
    pub type_code: String,
    pub department: String,
    #[serde(default)]
    pub cost_centre: String,
    pub requester_email: String,
    #[serde(default = "default_urgency")]
    pub urgency: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub business_impact: String,
    #[serde(default)]
    pub alternatives: String,
    #[serde(default)]
    pub cost_estimate: Decimal,
    #[serde(default)]
    pub required_date: Option<NaiveDate>,
}

fn default_urgency() -> String {
    "Normal".to_string()
}

/// Field changes supplied on resubmission after a request for information.
/// Absent fields keep their current value; classification fields may change,
/// which triggers a fresh rule match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JustificationUpdate {
    pub title: Option<String>,
    pub type_code: Option<String>,
    pub department: Option<String>,
    pub cost_centre: Option<String>,
    pub urgency: Option<String>,
    pub description: Option<String>,
    pub business_impact: Option<String>,
    pub alternatives: Option<String>,
    pub cost_estimate: Option<Decimal>,
    pub required_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    pub id: JustificationId,
    pub title: String,
    pub type_code: String,
    pub department: String,
    pub cost_centre: String,
    pub requester_email: String,
    pub urgency: String,
    pub description: String,
    pub business_impact: String,
    pub alternatives: String,
    pub cost_estimate: Decimal,
    pub required_date: Option<NaiveDate>,
    pub status: JustificationStatus,
    pub plan_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JustificationDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::InvalidJustification("title must not be empty".to_string()));
        }
        if self.requester_email.trim().is_empty() {
            return Err(DomainError::InvalidJustification(
                "requester_email must not be empty".to_string(),
            ));
        }
        if self.department.trim().is_empty() {
            return Err(DomainError::InvalidJustification(
                "department must not be empty".to_string(),
            ));
        }
        if self.type_code.trim().is_empty() {
            return Err(DomainError::InvalidJustification(
                "type_code must not be empty".to_string(),
            ));
        }
        if self.cost_estimate < Decimal::ZERO {
            return Err(DomainError::InvalidJustification(
                "cost_estimate must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Justification {
    /// Create a freshly submitted justification. The workflow engine moves it
    /// to `InReview` once a routing rule has matched.
    pub fn submit(draft: JustificationDraft) -> Result<Self, DomainError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: JustificationId(Uuid::new_v4().to_string()),
            title: draft.title,
            type_code: draft.type_code,
            department: draft.department,
            cost_centre: draft.cost_centre,
            requester_email: draft.requester_email,
            urgency: draft.urgency,
            description: draft.description,
            business_impact: draft.business_impact,
            alternatives: draft.alternatives,
            cost_estimate: draft.cost_estimate,
            required_date: draft.required_date,
            status: JustificationStatus::Submitted,
            plan_version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn can_transition_to(&self, next: JustificationStatus) -> bool {
        use JustificationStatus::{Approved, InReview, NeedsInfo, Rejected, Submitted};
        matches!(
            (self.status, next),
            (Submitted, InReview)
                | (InReview, NeedsInfo)
                | (InReview, Approved)
                | (InReview, Rejected)
                | (NeedsInfo, InReview)
        )
    }

    pub fn transition_to(&mut self, next: JustificationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }

    /// Apply resubmission field updates and re-validate the result.
    pub fn apply_update(&mut self, update: JustificationUpdate) -> Result<(), DomainError> {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(type_code) = update.type_code {
            self.type_code = type_code;
        }
        if let Some(department) = update.department {
            self.department = department;
        }
        if let Some(cost_centre) = update.cost_centre {
            self.cost_centre = cost_centre;
        }
        if let Some(urgency) = update.urgency {
            self.urgency = urgency;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(business_impact) = update.business_impact {
            self.business_impact = business_impact;
        }
        if let Some(alternatives) = update.alternatives {
            self.alternatives = alternatives;
        }
        if let Some(cost_estimate) = update.cost_estimate {
            self.cost_estimate = cost_estimate;
        }
        if let Some(required_date) = update.required_date {
            self.required_date = Some(required_date);
        }

        if self.title.trim().is_empty() {
            return Err(DomainError::InvalidJustification("title must not be empty".to_string()));
        }
        if self.cost_estimate < Decimal::ZERO {
            return Err(DomainError::InvalidJustification(
                "cost_estimate must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
