//! `api` crate — HTTP REST layer.
//!
//! Exposes:
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows
//!   GET    /api/v1/workflows/{id}
//!   DELETE /api/v1/workflows/{id}
//!   POST   /api/v1/workflows/{id}/execute
//!   GET    /api/v1/runs
//!   GET    /api/v1/runs/{id}
//!   POST   /webhook/{path}

pub mod handlers;

use std::sync::Arc;

use db::{DbPool, PgCredentialStore};
use engine::{Engine, ExecutorConfig};
use nodes::NodeRegistry;

pub use handlers::{router, AppState};

/// Build the application state and serve the API on `bind`.
pub async fn serve(bind: &str, pool: DbPool) -> anyhow::Result<()> {
    let registry = Arc::new(NodeRegistry::default());
    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let engine = Arc::new(Engine::new(registry, credentials, ExecutorConfig::default()));

    let state = AppState { pool, engine };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("API listening on {bind}");
    axum::serve(listener, app).await?;
    Ok(())
}
