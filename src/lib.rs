pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{Settings, StoreBackend};
use crate::core::{state::AppState, telemetry};
use crate::store::{AttemptStore, MemoryStore, PgStore};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let store = open_store(&settings).await?;
    let state = AppState::new(settings, store);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        addr = %state.settings().server_addr(),
        environment = %state.settings().runtime().environment.as_str(),
        store = %state.settings().store().backend.as_str(),
        "Academia CBT API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn AttemptStore>> {
    match settings.store().backend {
        StoreBackend::Postgres => {
            let db_pool = db::init_pool(settings).await?;
            db::run_migrations(&db_pool).await?;
            Ok(Arc::new(PgStore::new(db_pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
