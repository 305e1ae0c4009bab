use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use privileges_backend::api::build_router;
use privileges_backend::app_state::AppState;
use privileges_backend::config::Config;
use privileges_backend::db::memory::MemoryStore;
use privileges_backend::db::pool::get_db_pool;
use privileges_backend::db::queries::requests::PgApprovalStore;
use privileges_backend::utils::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config).context("Failed to create logs directory")?;

    let state = match &config.database_url {
        Some(database_url) => {
            let pool = get_db_pool(&config, database_url)
                .await
                .context("Failed to connect to the database")?;
            let store = Arc::new(PgApprovalStore::new(pool.clone()));
            AppState::new(store, &config, Some(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            AppState::new(Arc::new(MemoryStore::new()), &config, None)
        }
    };
    let pool = state.pool.clone();

    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind listener")?;
    info!("Server running at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(pool))
        .await
        .context("Server encountered an error")?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal(pool: Option<PgPool>) {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down...");
    if let Some(pool) = pool {
        info!("Closing database pool...");
        pool.close().await;
    }
}
