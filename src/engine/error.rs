use uuid::Uuid;

use crate::db::models::requests::RequestStatus;
use crate::db::models::role::Role;
use crate::db::store::StoreError;

/// Result type for approval engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Why a decision was refused or could not be recorded
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Privilege request {0} not found")]
    NotFound(Uuid),

    #[error("Role {0} may not act on privilege requests")]
    Forbidden(Role),

    #[error("Privilege request {request_id} is already {status:?}")]
    InvalidState {
        request_id: Uuid,
        status: RequestStatus,
    },

    #[error("Invalid decision: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
