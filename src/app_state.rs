use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::store::{ApprovalStore, UserDirectory};
use crate::engine::ApprovalEngine;
use crate::middleware::auth::{create_role_cache, RoleCache};

#[derive(Clone)]
pub struct AppState {
    pub engine: ApprovalEngine,
    pub directory: Arc<dyn UserDirectory>,
    pub role_cache: RoleCache,
    pub jwt_secret: Arc<str>,
    /// Present when running against Postgres; used by the readiness probe.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, config: &Config, pool: Option<PgPool>) -> Self
    where
        S: ApprovalStore + UserDirectory + 'static,
    {
        Self {
            engine: ApprovalEngine::new(store.clone()),
            directory: store,
            role_cache: create_role_cache(config.role_cache_ttl),
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
            pool,
        }
    }
}
