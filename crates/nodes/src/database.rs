//! The `databaseQuery` handler.
//!
//! Runs `queryText` with positional `queryParams` against Postgres. The
//! connection pool is owned by the handler family and cached per connection
//! string, with a bounded size and an acquire timeout, so a misbehaving
//! workflow cannot exhaust the database.
//!
//! Output shape: `{ "results": [row objects...], "rowCount": <n> }`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{json_or_string, require_str};
use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::NodeError;

const MAX_POOL_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// `databaseQuery` — parameterised SQL against a Postgres database whose
/// connection string arrives (already resolved) in config, typically via a
/// `{{credential.DatabaseConnectionString}}` placeholder.
pub struct DatabaseQueryHandler {
    pools: Mutex<HashMap<String, PgPool>>,
}

impl DatabaseQueryHandler {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    async fn pool_for(&self, connection_string: &str) -> Result<PgPool, NodeError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(connection_string) {
            return Ok(pool.clone());
        }

        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(connection_string)
            .await
            .map_err(|e| NodeError::Retryable(format!("database connection failed: {e}")))?;

        pools.insert(connection_string.to_string(), pool.clone());
        Ok(pool)
    }

    fn simulate(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        ctx.logger.info(format!(
            "Database query {}: SIMULATION, would execute query.",
            ctx.identifier()
        ));
        let results = json_or_string(config, "simulatedResults").unwrap_or_else(|| json!([]));
        let row_count = crate::config::opt_u64(config, "simulatedRowCount")
            .unwrap_or_else(|| results.as_array().map(Vec::len).unwrap_or(0) as u64);
        Ok(json!({ "results": results, "rowCount": row_count }))
    }

    async fn live(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let connection_string = require_str(config, "connectionString").map_err(|_| {
            NodeError::Fatal(
                "database connection string not found; bind it via \
                 {{credential.DatabaseConnectionString}} or {{env.DATABASE_URL}} \
                 in the 'connectionString' field"
                    .into(),
            )
        })?;
        let query_text = require_str(config, "queryText")?;

        let params: Vec<Value> = config
            .get("queryParams")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        ctx.logger.info(format!(
            "Database query {}: executing with {} parameter(s).",
            ctx.identifier(),
            params.len()
        ));

        let pool = self.pool_for(connection_string).await?;

        let mut query = sqlx::query(query_text);
        for param in &params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        query.bind(i)
                    } else {
                        query.bind(n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.clone()),
            };
        }

        let rows = query
            .fetch_all(&pool)
            .await
            .map_err(|e| NodeError::Retryable(format!("database query failed: {e}")))?;

        let results: Vec<Value> = rows.iter().map(row_to_json).collect();
        let row_count = results.len();

        Ok(json!({ "results": results, "rowCount": row_count }))
    }
}

impl Default for DatabaseQueryHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for DatabaseQueryHandler {
    fn node_type(&self) -> &str {
        "databaseQuery"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        if ctx.mode.is_simulation() {
            self.simulate(config, ctx)
        } else {
            self.live(config, ctx).await
        }
    }
}

/// Convert one row into a JSON object, column by column. Types without a
/// JSON mapping decode as null.
fn row_to_json(row: &PgRow) -> Value {
    let mut record = serde_json::Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), column_to_json(row, index));
    }
    Value::Object(record)
}

fn column_to_json(row: &PgRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Uuid>, _>(index) {
        return v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return v
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(index) {
        return v.unwrap_or(Value::Null);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionMode, RunLogger};

    fn ctx() -> HandlerContext {
        HandlerContext {
            node_id: "db_1".into(),
            node_name: "Query".into(),
            mode: ExecutionMode::Simulate,
            user_id: "tester".into(),
            logger: RunLogger::new(),
        }
    }

    #[tokio::test]
    async fn simulation_returns_simulated_results() {
        let handler = DatabaseQueryHandler::new();
        let config = json!({
            "queryText": "SELECT * FROM t WHERE id=$1",
            "simulatedResults": [{"id": 42, "name": "thing"}],
        });
        let out = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["results"][0]["id"], 42);
        assert_eq!(out["rowCount"], 1);
    }

    #[tokio::test]
    async fn simulated_row_count_override() {
        let handler = DatabaseQueryHandler::new();
        let config = json!({
            "queryText": "UPDATE t SET x = 1",
            "simulatedResults": [],
            "simulatedRowCount": 17,
        });
        let out = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["rowCount"], 17);
    }
}
