use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::role::Role;
use crate::engine::Actor;
use crate::utils::api_response::ApiResponse;

/// JWT claims issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject - user id (UUID)
    pub sub: String,
    pub username: String,
    /// Expiration timestamp (UNIX time)
    pub exp: usize,
}

/// User id -> role, refreshed from the directory after the TTL.
pub type RoleCache = Arc<Cache<Uuid, Role>>;

pub fn create_role_cache(ttl: Duration) -> RoleCache {
    Arc::new(Cache::builder().time_to_live(ttl).build())
}

fn unauthorized(message: &str) -> Response {
    ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, message, None).into_response()
}

/// **JWT Middleware** (bearer token -> `Claims`)
pub async fn jwt_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = req.headers().get("Authorization").ok_or_else(|| {
        warn!("Missing Authorization header");
        unauthorized("Missing Authorization header")
    })?;

    let token_str = auth_header.to_str().map_err(|_| {
        warn!("Invalid Authorization header format");
        ApiResponse::<()>::error(StatusCode::BAD_REQUEST, "Invalid Authorization header format", None)
            .into_response()
    })?;

    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("Invalid token format (missing 'Bearer ' prefix)");
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid token format (missing 'Bearer ' prefix)",
            None,
        )
        .into_response()
    })?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("JWT decoding failed: {:?}", e);
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid token",
            Some(json!({ "error": e.to_string() })),
        )
        .into_response()
    })?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// **Actor Middleware** (`Claims` -> `Actor` with the user's current role)
pub async fn actor_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| unauthorized("Missing authentication claims"))?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
        ApiResponse::<()>::error(StatusCode::BAD_REQUEST, "Invalid user ID format in token", None)
            .into_response()
    })?;

    let role = match state.role_cache.get(&user_id) {
        Some(role) => role,
        None => {
            let role = state
                .directory
                .user_role(user_id)
                .await
                .map_err(|err| {
                    error!("Role lookup failed: {:?}", err);
                    ApiResponse::<()>::error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to load user role",
                        Some(json!({ "error": err.to_string() })),
                    )
                    .into_response()
                })?
                .ok_or_else(|| {
                    warn!(%user_id, "Token subject is not a known user");
                    unauthorized("Unknown user")
                })?;
            state.role_cache.insert(user_id, role);
            role
        }
    };

    req.extensions_mut().insert(Actor { id: user_id, role });
    Ok(next.run(req).await)
}
