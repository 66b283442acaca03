//! Execution handler: run a stored workflow and persist the run record.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use db::repository::{runs as run_repo, workflows as wf_repo};
use engine::{ExecutionMode, Workflow};

use super::AppState;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowDto {
    /// "simulate" (default) or "live".
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
    /// Pre-supplied outputs keyed by node id; seeds bypass their handler.
    #[serde(default)]
    pub initial_data: Option<HashMap<String, Value>>,
    /// The user on whose behalf credentials are resolved.
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<Json<Value>, StatusCode> {
    let wf_row = match wf_repo::get_workflow(&state.pool, id).await {
        Ok(row) => row,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut workflow: Workflow = match serde_json::from_value(wf_row.definition) {
        Ok(wf) => wf,
        Err(_) => return Err(StatusCode::UNPROCESSABLE_ENTITY),
    };
    if workflow.name.is_none() {
        workflow.name = Some(wf_row.name);
    }

    let mode = payload.mode.unwrap_or(ExecutionMode::Simulate);
    let user_id = payload.user_id.unwrap_or_else(|| "anonymous".to_string());

    let report = match state
        .engine
        .execute(&workflow, mode, &user_id, payload.initial_data.clone())
        .await
    {
        Ok(report) => report,
        // Structural errors (cycle, unknown type, bad references).
        Err(e) => {
            tracing::warn!("workflow {id} rejected: {e}");
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    let initial_data: Option<Map<String, Value>> = payload
        .initial_data
        .map(|data| data.into_iter().collect());
    let record = report.clone().into_run_record(&workflow, initial_data);

    if let Err(e) = run_repo::insert_run(&state.pool, &record).await {
        // The caller still gets the report; history is best-effort.
        tracing::error!("failed to persist run record {}: {e}", record.id);
    }

    Ok(Json(json!({
        "runId": record.id,
        "status": report.status,
        "finalWorkflowData": report.final_workflow_data,
        "serverLogs": report.server_logs,
    })))
}
