use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::models::approval::{Approval, DecisionEvent};
use crate::db::models::requests::{
    PrivilegeRequest, RequestDetail, RequestStatus, RequestedPrivilege,
};
use crate::db::models::role::Role;
use crate::db::store::{
    ApprovalStore, ApprovalUnit, StoreError, StoreResult, UserDirectory,
};
use crate::engine::levels::ApprovalLevel;

/// Full contents of an in-memory store.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryState {
    pub requests: HashMap<Uuid, PrivilegeRequest>,
    pub privileges: Vec<RequestedPrivilege>,
    pub approvals: Vec<Approval>,
    pub events: Vec<DecisionEvent>,
    pub users: HashMap<Uuid, Role>,
}

/// Process-local store. A unit of work holds the whole store locked and
/// stages its writes on a copy, published only on commit.
///
/// `begin` clones every stored row, so each decision costs time in the size
/// of the store. Meant for tests and local runs, not production volumes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.users.insert(id, role);
        id
    }

    /// Seed a request the way the submission flow would, with one
    /// granted line per privilege id, in order.
    pub async fn seed_request(
        &self,
        requester_id: Uuid,
        status: RequestStatus,
        current_level: Option<ApprovalLevel>,
        privilege_ids: &[Uuid],
    ) -> RequestDetail {
        let now = Utc::now();
        let request = PrivilegeRequest {
            id: Uuid::new_v4(),
            requester_id,
            status,
            current_level,
            created_at: now,
            updated_at: now,
        };
        let privileges: Vec<RequestedPrivilege> = privilege_ids
            .iter()
            .zip(0..)
            .map(|(privilege_id, position)| RequestedPrivilege {
                id: Uuid::new_v4(),
                request_id: request.id,
                privilege_id: *privilege_id,
                position,
                is_granted: true,
                deny_reason: None,
            })
            .collect();

        let mut state = self.state.lock().await;
        state.requests.insert(request.id, request.clone());
        state.privileges.extend(privileges.iter().cloned());

        RequestDetail {
            request,
            privileges,
            approvals: Vec::new(),
        }
    }

    /// Copy of everything currently committed.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

impl MemoryState {
    fn privileges_of(&self, request_id: Uuid) -> Vec<RequestedPrivilege> {
        let mut privileges: Vec<_> = self
            .privileges
            .iter()
            .filter(|p| p.request_id == request_id)
            .cloned()
            .collect();
        privileges.sort_by_key(|p| p.position);
        privileges
    }

    fn approvals_of(&self, request_id: Uuid) -> Vec<Approval> {
        let mut approvals: Vec<_> = self
            .approvals
            .iter()
            .filter(|a| a.request_id == request_id)
            .cloned()
            .collect();
        approvals.sort_by_key(|a| (a.level, a.created_at));
        approvals
    }
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn ApprovalUnit>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnit { guard, staged }))
    }

    async fn find_request(&self, request_id: Uuid) -> StoreResult<Option<RequestDetail>> {
        let state = self.state.lock().await;
        Ok(state.requests.get(&request_id).map(|request| RequestDetail {
            request: request.clone(),
            privileges: state.privileges_of(request_id),
            approvals: state.approvals_of(request_id),
        }))
    }

    async fn list_open_requests(
        &self,
        level: Option<ApprovalLevel>,
    ) -> StoreResult<Vec<PrivilegeRequest>> {
        let state = self.state.lock().await;
        let mut open: Vec<_> = state
            .requests
            .values()
            .filter(|r| !r.status.is_terminal())
            .filter(|r| level.is_none() || r.current_level == level)
            .cloned()
            .collect();
        open.sort_by_key(|r| r.created_at);
        Ok(open)
    }

    async fn decision_events(&self, request_id: Uuid) -> StoreResult<Vec<DecisionEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_role(&self, user_id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.state.lock().await.users.get(&user_id).copied())
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl ApprovalUnit for MemoryUnit {
    async fn lock_request(&mut self, request_id: Uuid) -> StoreResult<Option<PrivilegeRequest>> {
        Ok(self.staged.requests.get(&request_id).cloned())
    }

    async fn requested_privileges(&mut self, request_id: Uuid) -> StoreResult<Vec<RequestedPrivilege>> {
        Ok(self.staged.privileges_of(request_id))
    }

    async fn find_approval(
        &mut self,
        request_id: Uuid,
        approver_id: Uuid,
    ) -> StoreResult<Option<Approval>> {
        Ok(self
            .staged
            .approvals
            .iter()
            .find(|a| a.request_id == request_id && a.approver_id == approver_id)
            .cloned())
    }

    async fn save_approval(&mut self, approval: &Approval) -> StoreResult<Approval> {
        let existing = self
            .staged
            .approvals
            .iter_mut()
            .find(|a| a.request_id == approval.request_id && a.approver_id == approval.approver_id);

        match existing {
            Some(row) => {
                row.status = approval.status;
                row.comments = approval.comments.clone();
                row.decided_at = approval.decided_at;
                Ok(row.clone())
            }
            None => {
                self.staged.approvals.push(approval.clone());
                Ok(approval.clone())
            }
        }
    }

    async fn update_privilege(&mut self, privilege: &RequestedPrivilege) -> StoreResult<()> {
        let row = self
            .staged
            .privileges
            .iter_mut()
            .find(|p| p.id == privilege.id && p.request_id == privilege.request_id)
            .ok_or_else(|| StoreError::Conflict(format!("requested privilege {}", privilege.id)))?;
        row.is_granted = privilege.is_granted;
        row.deny_reason = privilege.deny_reason.clone();
        Ok(())
    }

    async fn update_request(&mut self, request: &PrivilegeRequest) -> StoreResult<()> {
        let row = self
            .staged
            .requests
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::Conflict(format!("privilege request {}", request.id)))?;
        row.status = request.status;
        row.current_level = request.current_level;
        row.updated_at = request.updated_at;
        Ok(())
    }

    async fn append_event(&mut self, event: &DecisionEvent) -> StoreResult<()> {
        self.staged.events.push(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnit { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
