use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::approval::{Approval, DecisionEvent};
use crate::db::models::requests::{PrivilegeRequest, RequestDetail, RequestedPrivilege};
use crate::db::models::role::Role;
use crate::engine::levels::ApprovalLevel;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Row vanished during transaction: {0}")]
    Conflict(String),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Shared storage for requests, privileges, approvals and decision events.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Opens a unit of work. Dropping it without `commit` discards every write.
    async fn begin(&self) -> StoreResult<Box<dyn ApprovalUnit>>;

    async fn find_request(&self, request_id: Uuid) -> StoreResult<Option<RequestDetail>>;

    /// Open requests (`PENDING`/`IN_REVIEW`), filtered to one level when given.
    async fn list_open_requests(
        &self,
        level: Option<ApprovalLevel>,
    ) -> StoreResult<Vec<PrivilegeRequest>>;

    async fn decision_events(&self, request_id: Uuid) -> StoreResult<Vec<DecisionEvent>>;
}

/// One atomic transaction against the store.
///
/// `lock_request` must hold off any other unit touching the same request
/// until this one commits or is dropped.
#[async_trait]
pub trait ApprovalUnit: Send {
    async fn lock_request(&mut self, request_id: Uuid) -> StoreResult<Option<PrivilegeRequest>>;

    async fn requested_privileges(&mut self, request_id: Uuid) -> StoreResult<Vec<RequestedPrivilege>>;

    async fn find_approval(
        &mut self,
        request_id: Uuid,
        approver_id: Uuid,
    ) -> StoreResult<Option<Approval>>;

    /// Insert or overwrite the approval keyed on `(request_id, approver_id)`.
    async fn save_approval(&mut self, approval: &Approval) -> StoreResult<Approval>;

    async fn update_privilege(&mut self, privilege: &RequestedPrivilege) -> StoreResult<()>;

    async fn update_request(&mut self, request: &PrivilegeRequest) -> StoreResult<()>;

    async fn append_event(&mut self, event: &DecisionEvent) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Identity lookup used to turn an authenticated user id into an approver role.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_role(&self, user_id: Uuid) -> StoreResult<Option<Role>>;
}
