// src/db/models/requests.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::approval::Approval;
use crate::engine::levels::ApprovalLevel;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "request_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
}

impl RequestStatus {
    /// Approved and rejected requests accept no further decisions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

/// A practitioner's request for one or more clinical privileges.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow, ToSchema)]
pub struct PrivilegeRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub status: RequestStatus,
    /// Level expected to act next. Unset once the request is terminal.
    pub current_level: Option<ApprovalLevel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One privilege line inside a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow, ToSchema)]
pub struct RequestedPrivilege {
    pub id: Uuid,
    pub request_id: Uuid,
    pub privilege_id: Uuid,
    pub position: i32,
    pub is_granted: bool,
    pub deny_reason: Option<String>,
}

impl RequestedPrivilege {
    /// Grant or deny this line. A reason only survives a denial.
    pub fn apply(&mut self, is_granted: bool, deny_reason: Option<&str>) {
        self.is_granted = is_granted;
        self.deny_reason = if is_granted {
            None
        } else {
            deny_reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_owned)
        };
    }
}

/// A request with everything hanging off it, as served by `GET /requests/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: PrivilegeRequest,
    pub privileges: Vec<RequestedPrivilege>,
    pub approvals: Vec<Approval>,
}
