use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, DealChanges, DealEvent, DealId, NewDeal, Role, UserId};
use super::policy::PolicyId;
use super::report::Target;
use super::repository::{DealRepository, NotificationPublisher, PolicyStore};
use super::service::{DealServiceError, DealWorkflowService};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<R, P, N> = Arc<DealWorkflowService<R, P, N>>;

#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub deal_ids: Vec<DealId>,
}

#[derive(Debug, Deserialize)]
pub struct PerformanceRequest {
    /// Any day within the reported month.
    pub month: NaiveDate,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// HTTP endpoints for deals, policies, payouts, and reports.
pub fn deal_router<R, P, N>(service: SharedService<R, P, N>) -> Router
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/deals", post(create_handler::<R, P, N>))
        .route(
            "/api/v1/deals/:deal_id",
            get(get_handler::<R, P, N>)
                .patch(update_handler::<R, P, N>)
                .delete(delete_handler::<R, P, N>),
        )
        .route(
            "/api/v1/deals/:deal_id/transitions",
            post(transition_handler::<R, P, N>),
        )
        .route(
            "/api/v1/deals/:deal_id/incentive",
            post(recompute_handler::<R, P, N>),
        )
        .route(
            "/api/v1/deals/:deal_id/policy",
            get(resolve_policy_handler::<R, P, N>),
        )
        .route(
            "/api/v1/policies/:policy_id",
            get(policy_handler::<R, P, N>),
        )
        .route("/api/v1/payouts/pending", get(pending_handler::<R, P, N>))
        .route("/api/v1/payouts/paid", get(paid_handler::<R, P, N>))
        .route("/api/v1/payouts/summary", get(summary_handler::<R, P, N>))
        .route(
            "/api/v1/payouts/mark-paid",
            post(mark_paid_handler::<R, P, N>),
        )
        .route(
            "/api/v1/reports/performance",
            post(performance_handler::<R, P, N>),
        )
        .with_state(service)
}

pub(crate) async fn create_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    headers: HeaderMap,
    axum::Json(new_deal): axum::Json<NewDeal>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.create_deal(&actor, new_deal) {
        Ok(deal) => (StatusCode::CREATED, axum::Json(deal)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(deal_id): Path<String>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.get(&DealId(deal_id)) {
        Ok(deal) => (StatusCode::OK, axum::Json(deal)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(deal_id): Path<String>,
    headers: HeaderMap,
    axum::Json(changes): axum::Json<DealChanges>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.update_terms(&DealId(deal_id), &actor, changes) {
        Ok(deal) => (StatusCode::OK, axum::Json(deal.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(deal_id): Path<String>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.delete_deal(&DealId(deal_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn transition_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(deal_id): Path<String>,
    headers: HeaderMap,
    axum::Json(event): axum::Json<DealEvent>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.transition(&DealId(deal_id), event, &actor) {
        Ok(deal) => (StatusCode::OK, axum::Json(deal.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn recompute_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(deal_id): Path<String>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.recompute_incentive(&DealId(deal_id)) {
        Ok(deal) => (StatusCode::OK, axum::Json(deal.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resolve_policy_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(deal_id): Path<String>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.resolve_policy(&DealId(deal_id)) {
        Ok(resolved) => (StatusCode::OK, axum::Json(resolved)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn policy_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(policy_id): Path<u64>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.get_policy(PolicyId(policy_id)) {
        Ok(policy) => (StatusCode::OK, axum::Json(policy)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pending_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.list_pending() {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn paid_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.list_paid() {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn summary_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.summary() {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn mark_paid_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<MarkPaidRequest>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.mark_paid(&actor, &request.deal_ids) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn performance_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    axum::Json(request): axum::Json<PerformanceRequest>,
) -> Response
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    match service.performance(&request.targets, request.month) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Read the acting user from `x-actor-id` and `x-actor-role`.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let Some(user_id) = header_value(headers, ACTOR_ID_HEADER) else {
        return Err(bad_actor(format!("missing {ACTOR_ID_HEADER} header")));
    };
    let role = header_value(headers, ACTOR_ROLE_HEADER).map(str::to_ascii_lowercase);
    let role = match role.as_deref() {
        Some("sales") => Role::Sales,
        Some("admin") => Role::Admin,
        Some(other) => return Err(bad_actor(format!("unknown role '{other}'"))),
        None => return Err(bad_actor(format!("missing {ACTOR_ROLE_HEADER} header"))),
    };

    Ok(Actor {
        user_id: UserId::new(user_id),
        role,
    })
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn bad_actor(message: String) -> Response {
    let payload = json!({
        "error": message,
        "kind": "invalid_actor",
    });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

pub(crate) fn error_status(error: &DealServiceError) -> StatusCode {
    match error {
        DealServiceError::InvalidAmount { .. } | DealServiceError::InvalidPolicyConfig(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DealServiceError::IllegalTransition(_) => StatusCode::CONFLICT,
        DealServiceError::DealNotFound(_) | DealServiceError::PolicyNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DealServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: DealServiceError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "kind": error.kind(),
    });
    (error_status(&error), axum::Json(payload)).into_response()
}
