//! Inbound webhook handler: find the workflow whose trigger claims the
//! path, seed the trigger node with the request, and run live.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Map, Value};

use db::repository::{runs as run_repo, workflows as wf_repo};
use engine::{ExecutionMode, Workflow};

use super::AppState;

pub async fn handle_webhook(
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    // 1. Find a workflow whose webhookTrigger node claims this path.
    let rows = match wf_repo::list_workflows(&state.pool).await {
        Ok(rows) => rows,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut matched: Option<(Workflow, String, String)> = None;
    for row in rows {
        let Ok(mut workflow) = serde_json::from_value::<Workflow>(row.definition.clone()) else {
            continue;
        };
        if let Some(trigger) = workflow.nodes.iter().find(|n| {
            n.node_type == "webhookTrigger"
                && n.config.get("pathSuffix").and_then(Value::as_str) == Some(path.as_str())
        }) {
            let trigger_id = trigger.id.clone();
            if workflow.name.is_none() {
                workflow.name = Some(row.name.clone());
            }
            matched = Some((workflow, trigger_id, row.name));
            break;
        }
    }

    let Some((workflow, trigger_id, workflow_name)) = matched else {
        return Err(StatusCode::NOT_FOUND);
    };

    // 2. Seed the trigger with the live request and execute.
    let header_object: Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();
    let query_object: Map<String, Value> = query
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    let mut seeds = HashMap::new();
    seeds.insert(
        trigger_id,
        json!({
            "requestBody": payload,
            "requestHeaders": header_object,
            "requestQuery": query_object,
            "status": "success",
        }),
    );

    let report = match state
        .engine
        .execute(&workflow, ExecutionMode::Live, "webhook", Some(seeds.clone()))
        .await
    {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("webhook workflow '{workflow_name}' rejected: {e}");
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    let record = report
        .clone()
        .into_run_record(&workflow, Some(seeds.into_iter().collect()));
    if let Err(e) = run_repo::insert_run(&state.pool, &record).await {
        tracing::error!("failed to persist webhook run {}: {e}", record.id);
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "runId": record.id, "status": report.status })),
    ))
}
