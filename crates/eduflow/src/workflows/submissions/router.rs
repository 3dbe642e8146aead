use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::bulk::BulkParams;
use super::domain::{
    CategoryId, ColumnId, Principal, PrincipalDirectory, PrincipalId, RegionId, SchoolId,
    SectorId, SubmissionId, SubmissionStatus, TransitionAction,
};
use super::repository::{NotificationSink, SubmissionFilter, SubmissionStore};
use super::service::{DraftEntry, SubmissionWorkflowService, WorkflowError};

/// Shared router state: the workflow service plus the principal directory
/// used to resolve `actor_id` parameters. Token issuance is the host's job.
pub struct WorkflowState<S, N> {
    pub service: Arc<SubmissionWorkflowService<S, N>>,
    pub principals: Arc<PrincipalDirectory>,
}

impl<S, N> Clone for WorkflowState<S, N> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            principals: self.principals.clone(),
        }
    }
}

/// Router builder exposing the submission workflow over HTTP. Every mutation
/// answers with the `{ success, error?, data? }` envelope.
pub fn submission_router<S, N>(
    service: Arc<SubmissionWorkflowService<S, N>>,
    principals: Arc<PrincipalDirectory>,
) -> Router
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let state = WorkflowState {
        service,
        principals,
    };
    Router::new()
        .route("/api/v1/submissions", get(list_handler::<S, N>))
        .route("/api/v1/submissions/draft", post(draft_handler::<S, N>))
        .route(
            "/api/v1/submissions/validate",
            post(validate_handler::<S, N>),
        )
        .route("/api/v1/submissions/submit", post(submit_handler::<S, N>))
        .route(
            "/api/v1/submissions/approve",
            post(approve_handler::<S, N>),
        )
        .route("/api/v1/submissions/reject", post(reject_handler::<S, N>))
        .route(
            "/api/v1/submissions/bulk/approve",
            post(bulk_approve_handler::<S, N>),
        )
        .route(
            "/api/v1/submissions/bulk/reject",
            post(bulk_reject_handler::<S, N>),
        )
        .route(
            "/api/v1/submissions/bulk/preview",
            post(bulk_preview_handler::<S, N>),
        )
        .route("/api/v1/dashboard", get(dashboard_handler::<S, N>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    actor_id: String,
    status: Option<String>,
    region_id: Option<String>,
    sector_id: Option<String>,
    school_id: Option<String>,
    category_id: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DashboardQuery {
    actor_id: String,
    today: Option<NaiveDate>,
}

/// Identifies one submission in request payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRef {
    pub school_id: SchoolId,
    pub category_id: CategoryId,
}

impl From<SubmissionRef> for SubmissionId {
    fn from(value: SubmissionRef) -> Self {
        SubmissionId {
            school: value.school_id,
            category: value.category_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DraftRequest {
    actor_id: String,
    school_id: SchoolId,
    category_id: CategoryId,
    entries: Vec<DraftEntryPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DraftEntryPayload {
    column_id: ColumnId,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateRequest {
    school_id: SchoolId,
    category_id: CategoryId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionRequest {
    actor_id: String,
    school_id: SchoolId,
    category_id: CategoryId,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkRequest {
    actor_id: String,
    ids: Vec<SubmissionRef>,
    reason: Option<String>,
    #[serde(default)]
    bypass_validation: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkPreviewRequest {
    actor_id: String,
    ids: Vec<SubmissionRef>,
    action: TransitionAction,
    reason: Option<String>,
    #[serde(default)]
    bypass_validation: bool,
}

fn ok_envelope<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": data })),
    )
        .into_response()
}

fn error_envelope(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::Validation(_) | WorkflowError::MissingReason => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        WorkflowError::SubmissionLocked { .. }
        | WorkflowError::IllegalTransition { .. }
        | WorkflowError::Conflict { .. } => StatusCode::CONFLICT,
        WorkflowError::UnknownSchool(_)
        | WorkflowError::UnknownCategory(_)
        | WorkflowError::UnknownColumn(_)
        | WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    if let WorkflowError::Validation(report) = &error {
        return (
            status,
            Json(json!({
                "success": false,
                "error": error.to_string(),
                "details": report,
            })),
        )
            .into_response();
    }
    error_envelope(status, error.to_string())
}

fn resolve_actor<S, N>(state: &WorkflowState<S, N>, actor_id: &str) -> Result<Principal, Response> {
    state
        .principals
        .resolve(&PrincipalId(actor_id.to_string()))
        .cloned()
        .ok_or_else(|| {
            error_envelope(
                StatusCode::FORBIDDEN,
                format!("unknown actor '{actor_id}'"),
            )
        })
}

fn parse_status(raw: &str) -> Result<SubmissionStatus, Response> {
    match raw {
        "draft" => Ok(SubmissionStatus::Draft),
        "pending" => Ok(SubmissionStatus::Pending),
        "approved" => Ok(SubmissionStatus::Approved),
        "rejected" => Ok(SubmissionStatus::Rejected),
        other => Err(error_envelope(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown status '{other}'"),
        )),
    }
}

pub(crate) async fn list_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let actor = match resolve_actor(&state, &query.actor_id) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let status = match query.status.as_deref().map(parse_status).transpose() {
        Ok(status) => status,
        Err(response) => return response,
    };
    let filter = SubmissionFilter {
        status,
        region: query.region_id.map(RegionId),
        sector: query.sector_id.map(SectorId),
        school: query.school_id.map(SchoolId),
        category: query.category_id.map(CategoryId),
        search: query.search,
    };

    match state.service.list(&actor, filter).await {
        Ok(views) => ok_envelope(views),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn draft_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<DraftRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let actor = match resolve_actor(&state, &request.actor_id) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let entries = request
        .entries
        .into_iter()
        .map(|entry| DraftEntry {
            column: entry.column_id,
            value: entry.value,
        })
        .collect();

    match state
        .service
        .save_draft(
            &actor,
            request.school_id,
            request.category_id,
            entries,
            Utc::now(),
        )
        .await
    {
        Ok(record) => ok_envelope(record),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn validate_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<ValidateRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    match state
        .service
        .validate_now(&request.school_id, &request.category_id)
        .await
    {
        Ok(report) => ok_envelope(report),
        Err(error) => error_response(error),
    }
}

async fn transition_handler<S, N>(
    state: WorkflowState<S, N>,
    request: TransitionRequest,
    action: TransitionAction,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let actor = match resolve_actor(&state, &request.actor_id) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = SubmissionId {
        school: request.school_id,
        category: request.category_id,
    };
    let now = Utc::now();

    let result = match action {
        TransitionAction::Submit => state.service.submit(&actor, id, now).await,
        TransitionAction::Approve => state.service.approve(&actor, id, now).await,
        TransitionAction::Reject => {
            state
                .service
                .reject(&actor, id, request.reason.as_deref().unwrap_or(""), now)
                .await
        }
        TransitionAction::Reopen => state.service.reopen(&actor, id, now).await,
    };

    match result {
        Ok(receipt) => ok_envelope(receipt),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    transition_handler(state, request, TransitionAction::Submit).await
}

pub(crate) async fn approve_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    transition_handler(state, request, TransitionAction::Approve).await
}

pub(crate) async fn reject_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    transition_handler(state, request, TransitionAction::Reject).await
}

pub(crate) async fn bulk_approve_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<BulkRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let actor = match resolve_actor(&state, &request.actor_id) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let ids: Vec<SubmissionId> = request.ids.into_iter().map(SubmissionId::from).collect();
    let params = BulkParams {
        bypass_validation: request.bypass_validation,
    };

    match state
        .service
        .bulk_approve(&actor, &ids, params, None, Utc::now())
        .await
    {
        Ok(outcome) => ok_envelope(outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn bulk_reject_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<BulkRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let actor = match resolve_actor(&state, &request.actor_id) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let ids: Vec<SubmissionId> = request.ids.into_iter().map(SubmissionId::from).collect();
    let params = BulkParams {
        bypass_validation: request.bypass_validation,
    };
    let reason = request.reason.unwrap_or_default();

    match state
        .service
        .bulk_reject(&actor, &ids, &reason, params, None, Utc::now())
        .await
    {
        Ok(outcome) => ok_envelope(outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn bulk_preview_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Json(request): Json<BulkPreviewRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let actor = match resolve_actor(&state, &request.actor_id) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let ids: Vec<SubmissionId> = request.ids.into_iter().map(SubmissionId::from).collect();
    let params = BulkParams {
        bypass_validation: request.bypass_validation,
    };

    match state
        .service
        .preview_bulk(&actor, &ids, request.action, request.reason.as_deref(), params)
        .await
    {
        Ok(summary) => ok_envelope(summary),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn dashboard_handler<S, N>(
    State(state): State<WorkflowState<S, N>>,
    Query(query): Query<DashboardQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    let actor = match resolve_actor(&state, &query.actor_id) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());

    match state.service.dashboard(&actor, today).await {
        Ok(view) => ok_envelope(view),
        Err(error) => error_response(error),
    }
}
