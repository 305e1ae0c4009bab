use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::approval::{Approval, ApprovalStatus, DecisionEvent, DecisionKind};
use crate::db::models::requests::{
    PrivilegeRequest, RequestDetail, RequestStatus, RequestedPrivilege,
};
use crate::db::models::role::Role;
use crate::engine::{Actor, ApprovalLevel, DecisionInput, DecisionResult, EngineError, PrivilegeDecision};
use crate::utils::api_response::ApiResponse;

pub fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/requests/queue", get(get_review_queue))
        .route("/requests/{request_id}", get(get_request_by_id))
        .route("/requests/{request_id}/decisions", post(submit_decision))
        .route("/requests/{request_id}/history", get(get_decision_history))
}

#[utoipa::path(
    post,
    path = "/requests/{request_id}/decisions",
    params(
        ("request_id" = Uuid, Path, description = "Privilege request ID")
    ),
    request_body = DecisionInput,
    responses(
        (status = 200, description = "Decision recorded", body = DecisionResult),
        (status = 400, description = "Unknown outcome or malformed body"),
        (status = 403, description = "Role may not approve"),
        (status = 404, description = "Privilege request not found"),
        (status = 409, description = "Privilege request already approved or rejected"),
        (status = 500, description = "Storage failure")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn submit_decision(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(request_id): Path<Uuid>,
    payload: Result<Json<DecisionInput>, JsonRejection>,
) -> Result<ApiResponse<DecisionResult>, ApiResponse<()>> {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            // Role, existence and state errors still win over a bad body.
            state.engine.check_decidable(request_id, actor).await?;
            warn!(%request_id, actor_id = %actor.id, "Decision refused: malformed body");
            return Err(EngineError::Validation(rejection.body_text()).into());
        }
    };

    let result = state
        .engine
        .submit_decision(request_id, actor, payload)
        .await?;

    info!(
        %request_id,
        actor_id = %actor.id,
        status = ?result.request.status,
        "Privilege request decision stored"
    );

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Decision recorded",
        result,
    ))
}

#[utoipa::path(
    get,
    path = "/requests/{request_id}",
    params(
        ("request_id" = Uuid, Path, description = "Privilege request ID")
    ),
    responses(
        (status = 200, description = "Privilege request retrieved", body = RequestDetail),
        (status = 403, description = "Not the requester or an approver"),
        (status = 404, description = "Privilege request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_request_by_id(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(request_id): Path<Uuid>,
) -> Result<ApiResponse<RequestDetail>, ApiResponse<()>> {
    let detail = state.engine.get_request(request_id).await?;

    if !actor.role.can_approve() && detail.request.requester_id != actor.id {
        warn!(%request_id, actor_id = %actor.id, "Read refused: not the requester");
        return Err(EngineError::Forbidden(actor.role).into());
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Privilege request retrieved",
        detail,
    ))
}

#[utoipa::path(
    get,
    path = "/requests/{request_id}/history",
    params(
        ("request_id" = Uuid, Path, description = "Privilege request ID")
    ),
    responses(
        (status = 200, description = "Decisions recorded on the request, oldest first", body = Vec<DecisionEvent>),
        (status = 403, description = "Role may not approve"),
        (status = 404, description = "Privilege request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_decision_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(request_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<DecisionEvent>>, ApiResponse<()>> {
    if !actor.role.can_approve() {
        return Err(EngineError::Forbidden(actor.role).into());
    }
    let events = state.engine.history(request_id).await?;
    Ok(ApiResponse::success(StatusCode::OK, "Decision history", events))
}

#[utoipa::path(
    get,
    path = "/requests/queue",
    responses(
        (status = 200, description = "Open requests waiting on the caller's level", body = Vec<PrivilegeRequest>),
        (status = 403, description = "Role may not approve")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_review_queue(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<ApiResponse<Vec<PrivilegeRequest>>, ApiResponse<()>> {
    let queue = state.engine.queue_for(actor.role).await?;
    Ok(ApiResponse::success(StatusCode::OK, "Review queue", queue))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_decision,
        get_request_by_id,
        get_decision_history,
        get_review_queue
    ),
    components(schemas(
        PrivilegeRequest,
        RequestDetail,
        RequestedPrivilege,
        RequestStatus,
        Approval,
        ApprovalStatus,
        ApprovalLevel,
        DecisionEvent,
        DecisionKind,
        DecisionInput,
        DecisionResult,
        PrivilegeDecision,
        Role
    )),
    tags(
        (name = "Requests", description = "Privilege request review and approval")
    )
)]
pub struct RequestDoc;
