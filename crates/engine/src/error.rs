//! Engine-level error types.
//!
//! Two tiers, matching the propagation policy:
//! - [`EngineError`] — structural problems that abort the whole run before
//!   any node executes. Returned as `Err` from `Engine::execute`.
//! - [`NodeFailure`] — node-scoped problems. Contained: they mark one node
//!   as `error` inside the report and never unwind the run.

use thiserror::Error;

/// Structural errors. Unrecoverable — the run aborts synchronously with no
/// partial report.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// A node's `type` has no registered handler.
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    /// The data-flow graph (error handles excluded) contains a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,
}

/// Node-scoped failures. Recorded into the failing node's context entry as
/// `error_message`; dependents are skipped or error-routed per the
/// scheduling rules.
#[derive(Debug, Error, Clone)]
pub enum NodeFailure {
    /// A placeholder in the node's inputs or config could not be resolved.
    #[error("placeholder resolution failed: {0}")]
    Placeholder(#[from] crate::template::ResolveError),

    /// `_flow_run_condition` was present but could not be evaluated.
    #[error("run condition evaluation failed: {0}")]
    Condition(String),

    /// The handler exhausted its retry policy (or failed fatally).
    #[error("{0}")]
    Handler(String),

    /// An execution attempt exceeded the per-node timeout.
    #[error("node execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The run was cancelled while this node was in flight.
    #[error("execution cancelled")]
    Cancelled,
}
