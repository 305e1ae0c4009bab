// src/db/models/approval.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::requests::RequestStatus;
use crate::db::models::role::Role;
use crate::engine::levels::ApprovalLevel;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "approval_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    ReturnedForModification,
}

/// What an approver decided on a request as a whole.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "decision_outcome", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Approved,
    Rejected,
    Returned,
}

impl DecisionKind {
    /// Parses the wire value of an outcome. Matching is exact; anything
    /// else, including other casings, yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "RETURNED" => Some(Self::Returned),
            _ => None,
        }
    }

    /// Status recorded on the approver's own approval row.
    pub fn approval_status(self) -> ApprovalStatus {
        match self {
            DecisionKind::Approved => ApprovalStatus::Approved,
            DecisionKind::Rejected => ApprovalStatus::Rejected,
            DecisionKind::Returned => ApprovalStatus::ReturnedForModification,
        }
    }
}

/// The standing decision of one approver on one request.
///
/// There is at most one row per `(request_id, approver_id)`; a second
/// decision by the same approver overwrites it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow, ToSchema)]
pub struct Approval {
    pub id: Uuid,
    pub request_id: Uuid,
    pub approver_id: Uuid,
    pub level: ApprovalLevel,
    pub status: ApprovalStatus,
    pub comments: Option<String>,
    /// Set exactly when `status` is no longer `PENDING`.
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of an accepted decision, consumed by audit and
/// notification collaborators.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow, ToSchema)]
pub struct DecisionEvent {
    pub id: Uuid,
    pub request_id: Uuid,
    pub approver_id: Uuid,
    pub actor_role: Role,
    pub outcome: DecisionKind,
    pub request_status: RequestStatus,
    pub current_level: Option<ApprovalLevel>,
    /// Privilege decisions that matched the request, as applied.
    #[schema(value_type = Object)]
    pub privilege_decisions: Value,
    pub recorded_at: DateTime<Utc>,
}
