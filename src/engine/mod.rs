//! Multi-level approval state machine for privilege requests.
//!
//! A request moves HEAD_OF_SECTION → HEAD_OF_DEPT → COMMITTEE →
//! MEDICAL_DIRECTOR. Each approver keeps a single approval row per request,
//! may grant or deny individual privileges, and every accepted decision is
//! committed as one unit together with the request's new status and level.

pub mod error;
pub mod levels;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::approval::{Approval, DecisionEvent, DecisionKind};
use crate::db::models::requests::{
    PrivilegeRequest, RequestDetail, RequestStatus, RequestedPrivilege,
};
use crate::db::models::role::Role;
use crate::db::store::ApprovalStore;

pub use error::{EngineError, EngineResult};
pub use levels::ApprovalLevel;

/// The authenticated user acting on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

/// Grant or deny one privilege line of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PrivilegeDecision {
    pub privilege_id: Uuid,
    pub is_granted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,
}

/// A decision as submitted by the caller, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DecisionInput {
    /// One of `APPROVED`, `REJECTED`, `RETURNED`.
    pub outcome: String,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub privilege_decisions: Option<Vec<PrivilegeDecision>>,
}

impl DecisionInput {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            comments: None,
            privilege_decisions: None,
        }
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn privilege(mut self, privilege_id: Uuid, is_granted: bool, deny_reason: Option<&str>) -> Self {
        self.privilege_decisions
            .get_or_insert_with(Vec::new)
            .push(PrivilegeDecision {
                privilege_id,
                is_granted,
                deny_reason: deny_reason.map(str::to_owned),
            });
        self
    }
}

/// Everything a caller needs to audit and notify after a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DecisionResult {
    pub request: PrivilegeRequest,
    pub privileges: Vec<RequestedPrivilege>,
    pub approval: Approval,
    pub event: DecisionEvent,
}

/// Status and level a request moves to after `outcome` by `role`.
///
/// The next level is derived from the acting role alone, not from which
/// levels have already signed off.
pub fn resolve_transition(
    outcome: DecisionKind,
    role: Role,
) -> (RequestStatus, Option<ApprovalLevel>) {
    match outcome {
        DecisionKind::Rejected => (RequestStatus::Rejected, None),
        DecisionKind::Returned => (RequestStatus::Pending, Some(ApprovalLevel::FIRST)),
        DecisionKind::Approved => match role.approval_level().and_then(ApprovalLevel::next) {
            Some(next) => (RequestStatus::InReview, Some(next)),
            // MEDICAL_DIRECTOR, or ADMIN signing off outside the chain
            None => (RequestStatus::Approved, None),
        },
    }
}

/// Level recorded on a new approval row. ADMIN acts at whatever level the
/// request is waiting on.
fn approval_level_for(role: Role, request: &PrivilegeRequest) -> ApprovalLevel {
    role.approval_level()
        .or(request.current_level)
        .unwrap_or(ApprovalLevel::FIRST)
}

#[derive(Clone)]
pub struct ApprovalEngine {
    store: Arc<dyn ApprovalStore>,
}

impl ApprovalEngine {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self { store }
    }

    /// Record `actor`'s decision on a request and advance it.
    ///
    /// Nothing is written unless the whole transition commits.
    pub async fn submit_decision(
        &self,
        request_id: Uuid,
        actor: Actor,
        decision: DecisionInput,
    ) -> EngineResult<DecisionResult> {
        if !actor.role.can_approve() {
            warn!(%request_id, actor_id = %actor.id, role = %actor.role, "Decision refused: role is not an approver");
            return Err(EngineError::Forbidden(actor.role));
        }

        let mut unit = self.store.begin().await?;

        let mut request = unit
            .lock_request(request_id)
            .await?
            .ok_or(EngineError::NotFound(request_id))?;

        if request.status.is_terminal() {
            warn!(%request_id, actor_id = %actor.id, status = ?request.status, "Decision refused: request already closed");
            return Err(EngineError::InvalidState {
                request_id,
                status: request.status,
            });
        }

        let outcome = DecisionKind::parse(&decision.outcome).ok_or_else(|| {
            EngineError::Validation(format!("unknown outcome '{}'", decision.outcome))
        })?;

        let now = Utc::now();
        let comments = decision
            .comments
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());

        let approval = match unit.find_approval(request_id, actor.id).await? {
            Some(prior) => Approval {
                status: outcome.approval_status(),
                comments,
                decided_at: Some(now),
                ..prior
            },
            None => Approval {
                id: Uuid::new_v4(),
                request_id,
                approver_id: actor.id,
                level: approval_level_for(actor.role, &request),
                status: outcome.approval_status(),
                comments,
                decided_at: Some(now),
                created_at: now,
            },
        };
        let approval = unit.save_approval(&approval).await?;

        let mut privileges = unit.requested_privileges(request_id).await?;
        let applied = apply_privilege_decisions(
            &mut privileges,
            decision.privilege_decisions.as_deref().unwrap_or_default(),
        );
        for index in &applied {
            unit.update_privilege(&privileges[*index]).await?;
        }

        let (status, current_level) = resolve_transition(outcome, actor.role);
        request.status = status;
        request.current_level = current_level;
        request.updated_at = now;
        unit.update_request(&request).await?;

        let event = DecisionEvent {
            id: Uuid::new_v4(),
            request_id,
            approver_id: actor.id,
            actor_role: actor.role,
            outcome,
            request_status: status,
            current_level,
            privilege_decisions: applied_json(&privileges, &applied),
            recorded_at: now,
        };
        unit.append_event(&event).await?;

        unit.commit().await?;

        info!(
            %request_id,
            actor_id = %actor.id,
            role = %actor.role,
            outcome = ?outcome,
            status = ?status,
            current_level = ?current_level,
            privileges_changed = applied.len(),
            "Decision recorded"
        );

        Ok(DecisionResult {
            request,
            privileges,
            approval,
            event,
        })
    }

    pub async fn get_request(&self, request_id: Uuid) -> EngineResult<RequestDetail> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or(EngineError::NotFound(request_id))
    }

    /// Requests waiting on `role`. ADMIN sees every open request.
    pub async fn queue_for(&self, role: Role) -> EngineResult<Vec<PrivilegeRequest>> {
        if !role.can_approve() {
            return Err(EngineError::Forbidden(role));
        }
        Ok(self.store.list_open_requests(role.approval_level()).await?)
    }

    /// Decision events for a request, oldest first. Unknown requests are NotFound.
    pub async fn history(&self, request_id: Uuid) -> EngineResult<Vec<DecisionEvent>> {
        self.get_request(request_id).await?;
        Ok(self.store.decision_events(request_id).await?)
    }

    /// Runs the checks `submit_decision` makes before looking at the
    /// decision itself, without opening a unit of work.
    pub async fn check_decidable(&self, request_id: Uuid, actor: Actor) -> EngineResult<()> {
        if !actor.role.can_approve() {
            return Err(EngineError::Forbidden(actor.role));
        }
        let detail = self.get_request(request_id).await?;
        if detail.request.status.is_terminal() {
            return Err(EngineError::InvalidState {
                request_id,
                status: detail.request.status,
            });
        }
        Ok(())
    }
}

/// Apply decisions to the request's own lines and return the indexes that
/// were touched. Decisions naming a privilege outside the request are ignored.
fn apply_privilege_decisions(
    privileges: &mut [RequestedPrivilege],
    decisions: &[PrivilegeDecision],
) -> Vec<usize> {
    let mut touched = Vec::new();
    for decision in decisions {
        let Some(index) = privileges
            .iter()
            .position(|p| p.privilege_id == decision.privilege_id)
        else {
            continue;
        };
        privileges[index].apply(decision.is_granted, decision.deny_reason.as_deref());
        if !touched.contains(&index) {
            touched.push(index);
        }
    }
    touched
}

fn applied_json(privileges: &[RequestedPrivilege], applied: &[usize]) -> serde_json::Value {
    json!(applied
        .iter()
        .map(|i| {
            let p = &privileges[*i];
            json!({
                "privilege_id": p.privilege_id,
                "is_granted": p.is_granted,
                "deny_reason": p.deny_reason,
            })
        })
        .collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_terminal_from_any_role() {
        for role in [
            Role::HeadOfSection,
            Role::HeadOfDept,
            Role::Committee,
            Role::MedicalDirector,
            Role::Admin,
        ] {
            assert_eq!(
                resolve_transition(DecisionKind::Rejected, role),
                (RequestStatus::Rejected, None)
            );
        }
    }

    #[test]
    fn return_goes_back_to_first_level() {
        assert_eq!(
            resolve_transition(DecisionKind::Returned, Role::Committee),
            (RequestStatus::Pending, Some(ApprovalLevel::HeadOfSection))
        );
    }

    #[test]
    fn approval_advances_one_level() {
        assert_eq!(
            resolve_transition(DecisionKind::Approved, Role::HeadOfSection),
            (RequestStatus::InReview, Some(ApprovalLevel::HeadOfDept))
        );
        assert_eq!(
            resolve_transition(DecisionKind::Approved, Role::HeadOfDept),
            (RequestStatus::InReview, Some(ApprovalLevel::Committee))
        );
        assert_eq!(
            resolve_transition(DecisionKind::Approved, Role::Committee),
            (RequestStatus::InReview, Some(ApprovalLevel::MedicalDirector))
        );
    }

    #[test]
    fn final_sign_off_approves() {
        assert_eq!(
            resolve_transition(DecisionKind::Approved, Role::MedicalDirector),
            (RequestStatus::Approved, None)
        );
        assert_eq!(
            resolve_transition(DecisionKind::Approved, Role::Admin),
            (RequestStatus::Approved, None)
        );
    }

    #[test]
    fn foreign_and_repeated_privileges() {
        let request_id = Uuid::new_v4();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let mut lines: Vec<_> = [p1, p2]
            .iter()
            .zip(0..)
            .map(|(privilege_id, position)| RequestedPrivilege {
                id: Uuid::new_v4(),
                request_id,
                privilege_id: *privilege_id,
                position,
                is_granted: true,
                deny_reason: None,
            })
            .collect();

        let decisions = vec![
            PrivilegeDecision { privilege_id: Uuid::new_v4(), is_granted: false, deny_reason: None },
            PrivilegeDecision { privilege_id: p2, is_granted: false, deny_reason: Some("no logbook".into()) },
            PrivilegeDecision { privilege_id: p2, is_granted: false, deny_reason: Some("no cases".into()) },
        ];
        let touched = apply_privilege_decisions(&mut lines, &decisions);

        assert_eq!(touched, vec![1]);
        assert!(lines[0].is_granted);
        assert_eq!(lines[1].deny_reason.as_deref(), Some("no cases"));
    }

    #[test]
    fn admin_records_at_waiting_level() {
        let now = Utc::now();
        let request = PrivilegeRequest {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            status: RequestStatus::InReview,
            current_level: Some(ApprovalLevel::Committee),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(approval_level_for(Role::Admin, &request), ApprovalLevel::Committee);
        assert_eq!(approval_level_for(Role::HeadOfDept, &request), ApprovalLevel::HeadOfDept);

        let fresh = PrivilegeRequest { current_level: None, status: RequestStatus::Pending, ..request };
        assert_eq!(approval_level_for(Role::Admin, &fresh), ApprovalLevel::FIRST);
    }
}
