pub mod health;
pub mod requests;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;
use crate::middleware::auth::{actor_middleware, jwt_middleware};

/// Full HTTP surface: probes and docs are public, request routes need a bearer token.
pub fn build_router(state: AppState) -> Router {
    let private_routes = requests::request_routes()
        .route_layer(from_fn_with_state(state.clone(), actor_middleware))
        .route_layer(from_fn_with_state(state.clone(), jwt_middleware));

    let doc = requests::RequestDoc::openapi();

    Router::new()
        .merge(health::health_routes())
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", doc).path("/rapidoc"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
