//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. Field names serialize to the camelCase wire shape used by
//! stored workflow definitions (`sourceNodeId`, `inputMapping`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::report::ExecutionResult;

/// Reserved output handle name routed by the error router rather than
/// ordinary data flow.
pub const ERROR_HANDLE: &str = "error";

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Canvas coordinates. Layout-only — irrelevant to execution, but carried
/// so a run snapshot round-trips losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within this workflow (referenced by connections
    /// and by `{{nodeId.path}}` placeholders).
    pub id: String,
    /// Maps to a registered `NodeHandler` implementation.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display name used in log messages.
    #[serde(default)]
    pub name: String,
    /// Typed parameters, may contain placeholders.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Declarative bindings: local variable name → placeholder expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mapping: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    /// Human-readable identifier used in logs: `'Name' (ID: node_id)`.
    pub fn identifier(&self) -> String {
        if self.name.is_empty() {
            format!("'{}'", self.id)
        } else {
            format!("'{}' (ID: {})", self.name, self.id)
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Directed edge from one node's output handle to another node's input
/// handle. An absent `source_handle` is the default data handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub source_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    pub target_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Connection {
    /// Whether this edge leaves the reserved "error" handle.
    pub fn is_error_handle(&self) -> bool {
        self.source_handle.as_deref() == Some(ERROR_HANDLE)
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition: the unit handed to `Engine::execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        Self {
            name: None,
            nodes,
            connections,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Per-node retry policy, read from the node's `retry` config field.
/// Governs only that node's own execution attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Minimum 1.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Base delay between attempts.
    #[serde(default)]
    pub delay_ms: u64,
    /// Multiplier applied per attempt (1.0 = constant delay).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f64>,
}

fn default_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay_ms: 0,
            backoff_factor: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let factor = self.backoff_factor.unwrap_or(1.0).max(0.0);
        let scaled = self.delay_ms as f64 * factor.powi(attempt.saturating_sub(1) as i32);
        std::time::Duration::from_millis(scaled as u64)
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Terminal status of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Error,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// Overall status of a run: `Failed` iff at least one node ended in
/// terminal `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// RunRecord
// ---------------------------------------------------------------------------

/// The persisted outcome of one execution. Created once per run, immutable
/// after completion; the engine produces it, an external store keeps it.
/// Re-running a past snapshot is just another `execute` call with
/// `workflow = workflow_snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: Uuid,
    pub workflow_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub workflow_snapshot: Workflow,
    pub execution_result: ExecutionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_data: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_deserializes_from_wire_shape() {
        let node: Node = serde_json::from_value(json!({
            "id": "http_node",
            "type": "httpRequest",
            "name": "Fetch thing",
            "config": { "url": "https://example.com" },
            "inputMapping": { "token": "{{credential.ApiToken}}" },
            "position": { "x": 100.0, "y": 200.0 }
        }))
        .unwrap();

        assert_eq!(node.node_type, "httpRequest");
        assert_eq!(
            node.input_mapping.as_ref().unwrap()["token"],
            "{{credential.ApiToken}}"
        );
        assert_eq!(node.identifier(), "'Fetch thing' (ID: http_node)");
    }

    #[test]
    fn connection_error_handle_detection() {
        let conn: Connection = serde_json::from_value(json!({
            "id": "c1",
            "sourceNodeId": "a",
            "sourceHandle": "error",
            "targetNodeId": "b"
        }))
        .unwrap();
        assert!(conn.is_error_handle());

        let plain: Connection = serde_json::from_value(json!({
            "sourceNodeId": "a",
            "targetNodeId": "b"
        }))
        .unwrap();
        assert!(!plain.is_error_handle());
        assert!(plain.source_handle.is_none());
    }

    #[test]
    fn retry_policy_defaults_and_backoff() {
        let policy: RetryPolicy = serde_json::from_value(json!({})).unwrap();
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.delay_ms, 0);

        let policy: RetryPolicy =
            serde_json::from_value(json!({ "attempts": 3, "delayMs": 100, "backoffFactor": 2.0 }))
                .unwrap();
        assert_eq!(policy.delay_for_attempt(1).as_millis(), 100);
        assert_eq!(policy.delay_for_attempt(2).as_millis(), 200);
        assert_eq!(policy.delay_for_attempt(3).as_millis(), 400);
    }

    #[test]
    fn run_status_display_matches_record_shape() {
        assert_eq!(RunStatus::Success.to_string(), "Success");
        assert_eq!(serde_json::to_value(RunStatus::Failed).unwrap(), "Failed");
    }
}
