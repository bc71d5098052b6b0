//! Repair request API endpoints.
//!
//! - POST /api/requests - Public intake, no actor required
//! - GET /api/requests?status= - Dispatcher list, optional status filter
//! - GET /api/requests/my - Master's own requests
//! - GET /api/requests/:id - One request
//! - PATCH /api/requests/:id/assign - Dispatcher assigns a master
//! - PATCH /api/requests/:id/cancel - Dispatcher cancels
//! - PATCH /api/requests/:id/take - Master takes assigned work
//! - PATCH /api/requests/:id/complete - Master completes work
//! - GET /api/masters - Masters a dispatcher can assign

use crate::WebResult;
use crate::error::AppError;
use crate::extractors::ActorContext;
use crate::state::AppState;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use repair_desk_core::types::{NewRequest, Request, RequestId, User, UserId};
use serde::Deserialize;

/// Query parameters for listing requests.
#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    /// Raw status filter; validated by the engine.
    pub status: Option<String>,
}

/// Body of an assign call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    /// Master to assign.
    pub master_id: UserId,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> WebResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request("INVALID_BODY", rejection.body_text()))
}

fn request_id(path: Result<Path<RequestId>, PathRejection>) -> WebResult<RequestId> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::bad_request("INVALID_ID", rejection.body_text()))
}

/// Create a request from the public intake form.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/requests \
///   -H "Content-Type: application/json" \
///   -d '{"clientName":"Иван Иванов","phone":"12345",
///        "address":"ул. Ленина 1","problemText":"течёт кран постоянно"}'
/// ```
///
/// # Errors
///
/// - 400 `INVALID_BODY`: body is not a JSON intake payload
/// - 422 `VALIDATION_ERROR`: a field is too short
pub async fn create_request(
    State(state): State<AppState>,
    body: Result<Json<NewRequest>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Request>)> {
    let input = json_body(body)?;
    let created = state.engine.create_request(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List requests (dispatcher only).
///
/// # Errors
///
/// - 400 `INVALID_FILTER`: unknown status value
/// - 403 `FORBIDDEN`: caller is a master
pub async fn list_requests(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    Query(query): Query<ListRequestsQuery>,
) -> WebResult<Json<Vec<Request>>> {
    let requests = state
        .engine
        .list_requests(&actor, query.status.as_deref())
        .await?;
    Ok(Json(requests))
}

/// List the calling master's requests.
///
/// # Errors
///
/// - 403 `FORBIDDEN`: caller is a dispatcher
pub async fn list_my_requests(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
) -> WebResult<Json<Vec<Request>>> {
    Ok(Json(state.engine.list_my_requests(&actor).await?))
}

/// Fetch one request.
///
/// # Errors
///
/// - 400 `INVALID_ID`: `:id` is not an integer
/// - 404 `NOT_FOUND`: missing, or not visible to the calling master
pub async fn get_request(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    id: Result<Path<RequestId>, PathRejection>,
) -> WebResult<Json<Request>> {
    let id = request_id(id)?;
    Ok(Json(state.engine.get_request(&actor, id).await?))
}

/// Assign a `new` request to a master.
///
/// # Errors
///
/// - 400 `UNKNOWN_MASTER`: `masterId` is not a master
/// - 404 `NOT_FOUND`: request does not exist
/// - 409 `INVALID_TRANSITION`: request is not `new`
pub async fn assign_request(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    id: Result<Path<RequestId>, PathRejection>,
    body: Result<Json<AssignBody>, JsonRejection>,
) -> WebResult<Json<Request>> {
    let id = request_id(id)?;
    let AssignBody { master_id } = json_body(body)?;
    Ok(Json(state.engine.assign_request(&actor, id, master_id).await?))
}

/// Cancel a `new` or `assigned` request.
///
/// # Errors
///
/// - 404 `NOT_FOUND`: request does not exist
/// - 409 `INVALID_TRANSITION`: request already in progress or finished
pub async fn cancel_request(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    id: Result<Path<RequestId>, PathRejection>,
) -> WebResult<Json<Request>> {
    let id = request_id(id)?;
    Ok(Json(state.engine.cancel_request(&actor, id).await?))
}

/// Take an assigned request into work.
///
/// # Errors
///
/// - 409 `CONFLICT`: not assigned to the caller, or another take won
pub async fn take_request(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    id: Result<Path<RequestId>, PathRejection>,
) -> WebResult<Json<Request>> {
    let id = request_id(id)?;
    Ok(Json(state.engine.take_request(&actor, id).await?))
}

/// Complete a request the caller has in progress.
///
/// # Errors
///
/// - 404 `NOT_FOUND`: request does not exist
/// - 409 `INVALID_TRANSITION`: not in progress, or owned by another master
pub async fn complete_request(
    State(state): State<AppState>,
    ActorContext(actor): ActorContext,
    id: Result<Path<RequestId>, PathRejection>,
) -> WebResult<Json<Request>> {
    let id = request_id(id)?;
    Ok(Json(state.engine.complete_request(&actor, id).await?))
}

/// List masters available for assignment.
///
/// Requires an actor but no particular role.
pub async fn list_masters(
    State(state): State<AppState>,
    ActorContext(_actor): ActorContext,
) -> WebResult<Json<Vec<User>>> {
    Ok(Json(state.engine.list_masters().await?))
}
