use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::approval::{Approval, DecisionEvent};
use crate::db::models::requests::{PrivilegeRequest, RequestDetail, RequestedPrivilege};
use crate::db::store::{ApprovalStore, ApprovalUnit, StoreError, StoreResult};
use crate::engine::levels::ApprovalLevel;

const REQUEST_COLUMNS: &str =
    "id, requester_id, status, current_level, created_at, updated_at";
const PRIVILEGE_COLUMNS: &str =
    "id, request_id, privilege_id, position, is_granted, deny_reason";
const APPROVAL_COLUMNS: &str =
    "id, request_id, approver_id, level, status, comments, decided_at, created_at";
const EVENT_COLUMNS: &str = "id, request_id, approver_id, actor_role, outcome, request_status, \
     current_level, privilege_decisions, recorded_at";

/// PostgreSQL-backed store. Concurrent decisions on one request are
/// serialised by the `FOR UPDATE` lock taken in [`ApprovalUnit::lock_request`].
#[derive(Clone)]
pub struct PgApprovalStore {
    pool: PgPool,
}

impl PgApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    async fn begin(&self) -> StoreResult<Box<dyn ApprovalUnit>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn find_request(&self, request_id: Uuid) -> StoreResult<Option<RequestDetail>> {
        let request = sqlx::query_as::<_, PrivilegeRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM privilege_requests WHERE id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(request) = request else {
            return Ok(None);
        };

        let privileges = sqlx::query_as::<_, RequestedPrivilege>(&format!(
            "SELECT {PRIVILEGE_COLUMNS} FROM requested_privileges \
             WHERE request_id = $1 ORDER BY position"
        ))
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        let approvals = sqlx::query_as::<_, Approval>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals \
             WHERE request_id = $1 ORDER BY level, created_at"
        ))
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(RequestDetail {
            request,
            privileges,
            approvals,
        }))
    }

    async fn list_open_requests(
        &self,
        level: Option<ApprovalLevel>,
    ) -> StoreResult<Vec<PrivilegeRequest>> {
        let requests = sqlx::query_as::<_, PrivilegeRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM privilege_requests \
             WHERE status IN ('PENDING', 'IN_REVIEW') \
               AND ($1::approval_level IS NULL OR current_level = $1) \
             ORDER BY created_at"
        ))
        .bind(level)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn decision_events(&self, request_id: Uuid) -> StoreResult<Vec<DecisionEvent>> {
        let events = sqlx::query_as::<_, DecisionEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM decision_events \
             WHERE request_id = $1 ORDER BY recorded_at"
        ))
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}

struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ApprovalUnit for PgUnit {
    async fn lock_request(&mut self, request_id: Uuid) -> StoreResult<Option<PrivilegeRequest>> {
        let request = sqlx::query_as::<_, PrivilegeRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM privilege_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(request_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(request)
    }

    async fn requested_privileges(&mut self, request_id: Uuid) -> StoreResult<Vec<RequestedPrivilege>> {
        let privileges = sqlx::query_as::<_, RequestedPrivilege>(&format!(
            "SELECT {PRIVILEGE_COLUMNS} FROM requested_privileges \
             WHERE request_id = $1 ORDER BY position"
        ))
        .bind(request_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(privileges)
    }

    async fn find_approval(
        &mut self,
        request_id: Uuid,
        approver_id: Uuid,
    ) -> StoreResult<Option<Approval>> {
        let approval = sqlx::query_as::<_, Approval>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals \
             WHERE request_id = $1 AND approver_id = $2 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(request_id)
        .bind(approver_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(approval)
    }

    async fn save_approval(&mut self, approval: &Approval) -> StoreResult<Approval> {
        let saved = sqlx::query_as::<_, Approval>(&format!(
            "INSERT INTO approvals (id, request_id, approver_id, level, status, comments, decided_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (request_id, approver_id) DO UPDATE \
             SET status = EXCLUDED.status, comments = EXCLUDED.comments, decided_at = EXCLUDED.decided_at \
             RETURNING {APPROVAL_COLUMNS}"
        ))
        .bind(approval.id)
        .bind(approval.request_id)
        .bind(approval.approver_id)
        .bind(approval.level)
        .bind(approval.status)
        .bind(&approval.comments)
        .bind(approval.decided_at)
        .bind(approval.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(saved)
    }

    async fn update_privilege(&mut self, privilege: &RequestedPrivilege) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE requested_privileges SET is_granted = $1, deny_reason = $2 \
             WHERE id = $3 AND request_id = $4",
        )
        .bind(privilege.is_granted)
        .bind(&privilege.deny_reason)
        .bind(privilege.id)
        .bind(privilege.request_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "requested privilege {}",
                privilege.id
            )));
        }
        Ok(())
    }

    async fn update_request(&mut self, request: &PrivilegeRequest) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE privilege_requests SET status = $1, current_level = $2, updated_at = $3 \
             WHERE id = $4",
        )
        .bind(request.status)
        .bind(request.current_level)
        .bind(request.updated_at)
        .bind(request.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("privilege request {}", request.id)));
        }
        Ok(())
    }

    async fn append_event(&mut self, event: &DecisionEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO decision_events \
             (id, request_id, approver_id, actor_role, outcome, request_status, current_level, privilege_decisions, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.id)
        .bind(event.request_id)
        .bind(event.approver_id)
        .bind(event.actor_role)
        .bind(event.outcome)
        .bind(event.request_status)
        .bind(event.current_level)
        .bind(&event.privilege_decisions)
        .bind(event.recorded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use sqlx::PgPool;

    use super::*;
    use crate::db::models::approval::ApprovalStatus;
    use crate::db::models::requests::RequestStatus;
    use crate::db::models::role::Role;
    use crate::engine::{Actor, ApprovalEngine, DecisionInput};

    async fn add_user(pool: &PgPool, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, role) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(format!("user-{id}"))
            .bind(role)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn seed_request(pool: &PgPool, requester: Uuid, privilege_ids: &[Uuid]) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO privilege_requests (id, requester_id, status, current_level) \
             VALUES ($1, $2, 'PENDING', 'HEAD_OF_SECTION')",
        )
        .bind(id)
        .bind(requester)
        .execute(pool)
        .await
        .unwrap();
        for (position, privilege_id) in privilege_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO requested_privileges (id, request_id, privilege_id, position) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(privilege_id)
            .bind(position as i32)
            .execute(pool)
            .await
            .unwrap();
        }
        id
    }

    fn approval(request_id: Uuid, approver_id: Uuid, status: ApprovalStatus) -> Approval {
        let now = Utc::now();
        Approval {
            id: Uuid::new_v4(),
            request_id,
            approver_id,
            level: ApprovalLevel::HeadOfSection,
            status,
            comments: None,
            decided_at: Some(now),
            created_at: now,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn upsert_keeps_first_approval_row(pool: PgPool) {
        let requester = add_user(&pool, Role::Employee).await;
        let approver = add_user(&pool, Role::HeadOfSection).await;
        let request_id = seed_request(&pool, requester, &[]).await;
        let store = PgApprovalStore::new(pool.clone());

        let first = approval(request_id, approver, ApprovalStatus::ReturnedForModification);
        let second = Approval {
            id: Uuid::new_v4(),
            comments: Some("second look".into()),
            ..approval(request_id, approver, ApprovalStatus::Approved)
        };

        let mut unit = store.begin().await.unwrap();
        unit.save_approval(&first).await.unwrap();
        let saved = unit.save_approval(&second).await.unwrap();
        unit.commit().await.unwrap();

        assert_eq!(saved.id, first.id);
        assert_eq!(saved.status, ApprovalStatus::Approved);
        let rows: Vec<(Uuid, Option<String>)> =
            sqlx::query_as("SELECT id, comments FROM approvals WHERE request_id = $1")
                .bind(request_id)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows, vec![(first.id, Some("second look".to_string()))]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn dropped_unit_rolls_back(pool: PgPool) {
        let requester = add_user(&pool, Role::Employee).await;
        let approver = add_user(&pool, Role::Committee).await;
        let request_id = seed_request(&pool, requester, &[]).await;
        let store = PgApprovalStore::new(pool.clone());

        {
            let mut unit = store.begin().await.unwrap();
            let mut request = unit.lock_request(request_id).await.unwrap().unwrap();
            request.status = RequestStatus::Rejected;
            request.current_level = None;
            unit.update_request(&request).await.unwrap();
            unit.save_approval(&approval(request_id, approver, ApprovalStatus::Rejected))
                .await
                .unwrap();
        }

        let detail = store.find_request(request_id).await.unwrap().unwrap();
        assert_eq!(detail.request.status, RequestStatus::Pending);
        assert_eq!(detail.request.current_level, Some(ApprovalLevel::HeadOfSection));
        assert!(detail.approvals.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn missing_rows_are_conflicts(pool: PgPool) {
        let store = PgApprovalStore::new(pool);
        let now = Utc::now();
        let ghost = PrivilegeRequest {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            status: RequestStatus::InReview,
            current_level: Some(ApprovalLevel::HeadOfDept),
            created_at: now,
            updated_at: now,
        };

        let mut unit = store.begin().await.unwrap();
        let err = unit.update_request(&ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn locked_request_blocks_second_unit(pool: PgPool) {
        let requester = add_user(&pool, Role::Employee).await;
        let request_id = seed_request(&pool, requester, &[]).await;
        let store = PgApprovalStore::new(pool);

        let mut first = store.begin().await.unwrap();
        first.lock_request(request_id).await.unwrap().unwrap();

        let contender = store.clone();
        let second = tokio::spawn(async move {
            let mut unit = contender.begin().await.unwrap();
            unit.lock_request(request_id).await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!second.is_finished());

        first.commit().await.unwrap();
        let locked = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap();
        assert!(locked.is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn engine_writes_satisfy_schema_checks(pool: PgPool) {
        let requester = add_user(&pool, Role::Employee).await;
        let p1 = Uuid::new_v4();
        let request_id = seed_request(&pool, requester, &[p1]).await;
        let engine = ApprovalEngine::new(Arc::new(PgApprovalStore::new(pool.clone())));

        let actor = |role: Role| {
            let pool = pool.clone();
            async move {
                Actor {
                    id: add_user(&pool, role).await,
                    role,
                }
            }
        };
        let hos = actor(Role::HeadOfSection).await;
        let hod = actor(Role::HeadOfDept).await;
        let committee = actor(Role::Committee).await;
        let md = actor(Role::MedicalDirector).await;

        let denied = DecisionInput::new("APPROVED").privilege(p1, false, Some("  no logbook "));
        let result = engine.submit_decision(request_id, hos, denied).await.unwrap();
        assert_eq!(result.privileges[0].deny_reason.as_deref(), Some("no logbook"));

        let returned = DecisionInput::new("RETURNED").comments("attach cases");
        let result = engine.submit_decision(request_id, hod, returned).await.unwrap();
        assert_eq!(result.request.status, RequestStatus::Pending);
        assert_eq!(result.request.current_level, Some(ApprovalLevel::HeadOfSection));

        let granted = DecisionInput::new("APPROVED").privilege(p1, true, Some("ignored"));
        let result = engine.submit_decision(request_id, hos, granted).await.unwrap();
        assert_eq!(result.privileges[0].deny_reason, None);

        for approver in [hod, committee, md] {
            engine
                .submit_decision(request_id, approver, DecisionInput::new("APPROVED"))
                .await
                .unwrap();
        }

        let detail = engine.get_request(request_id).await.unwrap();
        assert_eq!(detail.request.status, RequestStatus::Approved);
        assert_eq!(detail.request.current_level, None);
        assert_eq!(detail.approvals.len(), 4);
        assert_eq!(engine.history(request_id).await.unwrap().len(), 6);

        let rejected_id = seed_request(&pool, requester, &[]).await;
        let result = engine
            .submit_decision(rejected_id, committee, DecisionInput::new("REJECTED"))
            .await
            .unwrap();
        assert_eq!(result.request.status, RequestStatus::Rejected);
        assert_eq!(result.request.current_level, None);
    }
}
