//! JSON API routes for the approval workflow engine.
//!
//! Endpoints:
//! - `POST /api/justifications`                  — submit a justification
//! - `GET  /api/justifications?requester_email=` — list own submissions
//! - `POST /api/justifications/{id}/resubmit`    — resubmit after needs-info
//! - `GET  /api/inbox?approver_email=`           — pending approval tasks
//! - `POST /api/approvals/{task_id}/approve`     — approve the task
//! - `POST /api/approvals/{task_id}/reject`      — reject with a comment
//! - `POST /api/approvals/{task_id}/request-info` — ask the requester for more
//! - `POST /api/rules`                           — create/replace a routing rule

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use justifi_core::domain::justification::{
    Justification, JustificationDraft, JustificationId, JustificationUpdate,
};
use justifi_core::domain::rule::{RoutingRule, RuleDraft};
use justifi_core::domain::task::{ApprovalTask, TaskId};
use justifi_core::errors::DomainError;
use justifi_core::workflow::TaskAction;
use justifi_engine::{EngineError, InboxEntry, WorkflowEngine};

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<WorkflowEngine>,
}

pub fn router(engine: Arc<WorkflowEngine>) -> Router {
    Router::new()
        .route("/api/justifications", post(submit_justification).get(list_justifications))
        .route("/api/justifications/{id}/resubmit", post(resubmit_justification))
        .route("/api/inbox", get(list_inbox))
        .route("/api/approvals/{task_id}/approve", post(approve_task))
        .route("/api/approvals/{task_id}/reject", post(reject_task))
        .route("/api/approvals/{task_id}/request-info", post(request_info))
        .route("/api/rules", post(create_rule))
        .with_state(ApiState { engine })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub title: String,
    pub type_code: String,
    pub department: String,
    #[serde(default)]
    pub cost_centre: String,
    pub requester_email: String,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub business_impact: String,
    #[serde(default)]
    pub alternatives: String,
    #[serde(default)]
    pub cost_estimate: Decimal,
    #[serde(default)]
    pub required_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResubmitRequest {
    pub requester_email: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub type_code: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub cost_centre: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub business_impact: Option<String>,
    #[serde(default)]
    pub alternatives: Option<String>,
    #[serde(default)]
    pub cost_estimate: Option<Decimal>,
    #[serde(default)]
    pub required_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub actor_email: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub actor_email: String,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestInfoRequest {
    pub actor_email: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct MineQuery {
    pub requester_email: String,
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub approver_email: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EngineError::Domain(DomainError::InvalidJustification(_))
            | EngineError::Domain(DomainError::InvalidRule(_))
            | EngineError::Domain(DomainError::CommentRequired { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            EngineError::Domain(DomainError::NoRoutingRule { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "no_routing_rule")
            }
            EngineError::Domain(DomainError::NotAuthorized { .. }) => {
                (StatusCode::FORBIDDEN, "not_authorized")
            }
            EngineError::Domain(DomainError::TaskAlreadyResolved { .. }) => {
                (StatusCode::CONFLICT, "task_already_resolved")
            }
            EngineError::Domain(DomainError::InvalidStatusTransition { .. }) => {
                (StatusCode::CONFLICT, "invalid_state")
            }
            EngineError::TaskNotFound(_) | EngineError::JustificationNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            EngineError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        };

        (status, Json(ErrorBody { error: self.0.to_string(), code })).into_response()
    }
}

fn parse_required_date(raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(Some).map_err(|_| {
        ApiError(EngineError::Domain(DomainError::InvalidJustification(format!(
            "required_date `{raw}` is not a valid YYYY-MM-DD date"
        ))))
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_justification(
    State(state): State<ApiState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Justification>), ApiError> {
    let required_date = parse_required_date(request.required_date.as_deref())?;
    let draft = JustificationDraft {
        title: request.title,
        type_code: request.type_code,
        department: request.department,
        cost_centre: request.cost_centre,
        requester_email: request.requester_email,
        urgency: request.urgency.unwrap_or_else(|| "Normal".to_string()),
        description: request.description,
        business_impact: request.business_impact,
        alternatives: request.alternatives,
        cost_estimate: request.cost_estimate,
        required_date,
    };

    let justification = state.engine.submit(draft).await?;
    Ok((StatusCode::CREATED, Json(justification)))
}

async fn list_justifications(
    State(state): State<ApiState>,
    Query(query): Query<MineQuery>,
) -> Result<Json<Vec<Justification>>, ApiError> {
    Ok(Json(state.engine.list_mine(&query.requester_email).await?))
}

async fn resubmit_justification(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ResubmitRequest>,
) -> Result<Json<Justification>, ApiError> {
    let required_date = parse_required_date(request.required_date.as_deref())?;
    let update = JustificationUpdate {
        title: request.title,
        type_code: request.type_code,
        department: request.department,
        cost_centre: request.cost_centre,
        urgency: request.urgency,
        description: request.description,
        business_impact: request.business_impact,
        alternatives: request.alternatives,
        cost_estimate: request.cost_estimate,
        required_date,
    };

    let justification = state
        .engine
        .resubmit(&JustificationId(id), &request.requester_email, update)
        .await?;
    Ok(Json(justification))
}

async fn list_inbox(
    State(state): State<ApiState>,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Vec<InboxEntry>>, ApiError> {
    Ok(Json(state.engine.inbox(&query.approver_email).await?))
}

async fn approve_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApprovalTask>, ApiError> {
    let task = state
        .engine
        .act(&TaskId(task_id), &request.actor_email, TaskAction::Approve)
        .await?;
    Ok(Json(task))
}

async fn reject_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<ApprovalTask>, ApiError> {
    let task = state
        .engine
        .act(
            &TaskId(task_id),
            &request.actor_email,
            TaskAction::Reject { comment: request.comment },
        )
        .await?;
    Ok(Json(task))
}

async fn request_info(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
    Json(request): Json<RequestInfoRequest>,
) -> Result<Json<ApprovalTask>, ApiError> {
    let task = state
        .engine
        .act(
            &TaskId(task_id),
            &request.actor_email,
            TaskAction::RequestInfo { reason: request.reason },
        )
        .await?;
    Ok(Json(task))
}

async fn create_rule(
    State(state): State<ApiState>,
    Json(draft): Json<RuleDraft>,
) -> Result<(StatusCode, Json<RoutingRule>), ApiError> {
    let rule = state.engine.create_rule(draft).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}
