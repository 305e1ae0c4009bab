use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::role::Role;
use crate::db::queries::requests::PgApprovalStore;
use crate::db::store::{StoreResult, UserDirectory};

#[async_trait]
impl UserDirectory for PgApprovalStore {
    async fn user_role(&self, user_id: Uuid) -> StoreResult<Option<Role>> {
        let role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(role)
    }
}
