//! Run history handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use db::repository::runs as run_repo;

use super::AppState;

#[derive(serde::Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(
    Query(query): Query<ListRunsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::RunRow>>, StatusCode> {
    match run_repo::list_runs(&state.pool, query.limit.clamp(1, 500)).await {
        Ok(rows) => Ok(Json(rows)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn get_one(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<db::models::RunRow>, StatusCode> {
    match run_repo::get_run(&state.pool, id).await {
        Ok(row) => Ok(Json(row)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
