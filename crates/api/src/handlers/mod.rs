//! Route table and shared application state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use db::DbPool;
use engine::Engine;

pub mod workflows;
pub mod executions;
pub mod runs;
pub mod webhooks;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub engine: Arc<Engine>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/workflows",
            get(workflows::list).post(workflows::create),
        )
        .route(
            "/api/v1/workflows/{id}",
            get(workflows::get_one).delete(workflows::delete),
        )
        .route("/api/v1/workflows/{id}/execute", post(executions::execute))
        .route("/api/v1/runs", get(runs::list))
        .route("/api/v1/runs/{id}", get(runs::get_one))
        .route("/webhook/{path}", post(webhooks::handle_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
