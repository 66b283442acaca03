//! Result aggregation — the final report handed back to the caller.
//!
//! The overall status rule is authoritative and deliberately simple: a run
//! is `Failed` iff at least one node ended in terminal `error` (a cancelled
//! run also reports `Failed`). No node type is special-cased here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use nodes::LogEntry;

use crate::models::{RunRecord, RunStatus, Workflow};

/// The execution outcome embedded in a [`RunRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Per-node entries: output fields, `lastExecutionStatus`,
    /// `error_message` where applicable, and the resolved `input` snapshot.
    pub final_workflow_data: Map<String, Value>,
    /// Chronologically ordered log entries from the engine and handlers.
    pub server_logs: Vec<LogEntry>,
}

/// What `Engine::execute` returns: the execution result plus the
/// authoritative aggregate status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub status: RunStatus,
    pub final_workflow_data: Map<String, Value>,
    pub server_logs: Vec<LogEntry>,
}

impl ExecutionReport {
    /// The recorded `lastExecutionStatus` of a node, if it has one.
    pub fn node_status(&self, node_id: &str) -> Option<&str> {
        self.final_workflow_data
            .get(node_id)?
            .get("lastExecutionStatus")?
            .as_str()
    }

    /// Assemble the immutable run record for persistence.
    pub fn into_run_record(
        self,
        workflow: &Workflow,
        initial_data: Option<Map<String, Value>>,
    ) -> RunRecord {
        RunRecord {
            id: Uuid::new_v4(),
            workflow_name: workflow
                .name
                .clone()
                .unwrap_or_else(|| "Untitled Workflow".to_string()),
            timestamp: Utc::now(),
            status: self.status,
            workflow_snapshot: workflow.clone(),
            execution_result: ExecutionResult {
                final_workflow_data: self.final_workflow_data,
                server_logs: self.server_logs,
            },
            initial_data,
        }
    }
}

/// Build the report once the scheduler has drained.
pub(crate) fn build_report(
    final_workflow_data: Map<String, Value>,
    server_logs: Vec<LogEntry>,
    cancelled: bool,
) -> ExecutionReport {
    let any_error = final_workflow_data
        .values()
        .any(|entry| entry.get("lastExecutionStatus").and_then(Value::as_str) == Some("error"));

    let status = if any_error || cancelled {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };

    ExecutionReport {
        status,
        final_workflow_data,
        server_logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn all_success_is_success() {
        let report = build_report(
            data(json!({
                "a": { "lastExecutionStatus": "success" },
                "b": { "lastExecutionStatus": "skipped" }
            })),
            vec![],
            false,
        );
        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn single_error_fails_the_run() {
        let report = build_report(
            data(json!({
                "a": { "lastExecutionStatus": "success" },
                "b": { "lastExecutionStatus": "error", "error_message": "boom" }
            })),
            vec![],
            false,
        );
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.node_status("b"), Some("error"));
    }

    #[test]
    fn cancelled_run_is_failed() {
        let report = build_report(
            data(json!({ "a": { "lastExecutionStatus": "success" } })),
            vec![],
            true,
        );
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[test]
    fn run_record_snapshot_round_trips() {
        let workflow = Workflow {
            name: Some("demo".into()),
            nodes: vec![],
            connections: vec![],
        };
        let report = build_report(data(json!({})), vec![], false);
        let record = report.into_run_record(&workflow, None);

        assert_eq!(record.workflow_name, "demo");
        assert_eq!(record.status, RunStatus::Success);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "Success");
        assert!(json["executionResult"]["finalWorkflowData"].is_object());
        assert!(json["workflowSnapshot"]["nodes"].is_array());
    }
}
