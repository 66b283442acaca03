//! Run history repository — append-only storage of finished run records.

use engine::RunRecord;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::RunRow, DbError};

/// Append a finished run record. Called exactly once per run, after all
/// reachable nodes have a terminal status.
pub async fn insert_run(pool: &PgPool, record: &RunRecord) -> Result<RunRow, DbError> {
    let workflow_snapshot = serde_json::to_value(&record.workflow_snapshot)?;
    let execution_result = serde_json::to_value(&record.execution_result)?;
    let initial_data = record
        .initial_data
        .as_ref()
        .map(|data| serde_json::to_value(data))
        .transpose()?;

    let row = sqlx::query_as::<_, RunRow>(
        r#"
        INSERT INTO runs
            (id, workflow_name, timestamp, status, workflow_snapshot, execution_result, initial_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, workflow_name, timestamp, status, workflow_snapshot, execution_result, initial_data
        "#,
    )
    .bind(record.id)
    .bind(&record.workflow_name)
    .bind(record.timestamp)
    .bind(record.status.to_string())
    .bind(workflow_snapshot)
    .bind(execution_result)
    .bind(initial_data)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single run by its primary key.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<RunRow, DbError> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, workflow_name, timestamp, status, workflow_snapshot, execution_result, initial_data
        FROM runs WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return the most recent runs, newest first.
pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, workflow_name, timestamp, status, workflow_snapshot, execution_result, initial_data
        FROM runs ORDER BY timestamp DESC LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
