//! `engine` crate — core domain models, graph validation, placeholder
//! resolution, and the workflow execution engine.
//!
//! The engine runs one bounded workflow graph to completion per call:
//! validate the graph, schedule ready nodes concurrently, resolve each
//! node's inputs, gate on its run condition, dispatch through the handler
//! registry with retry and error routing, and aggregate the final report.
//!
//! Persistence is deliberately absent: callers look up workflows, supply a
//! credential store, and append the finished [`RunRecord`] themselves.

pub mod models;
pub mod error;
pub mod graph;
pub mod template;
pub mod mapper;
pub mod condition;
pub mod executor;
pub mod report;

pub use condition::evaluate_condition;
pub use error::{EngineError, NodeFailure};
pub use executor::{Engine, ExecutorConfig};
pub use graph::{build_graph, ExecutionGraph};
pub use models::{
    Connection, Node, NodeStatus, Position, RetryPolicy, RunRecord, RunStatus, Workflow,
    ERROR_HANDLE,
};
pub use report::{ExecutionReport, ExecutionResult};
pub use template::{CredentialStore, CredentialStoreError, InMemoryCredentials, ResolveError};

// Shared execution types live in the nodes crate; re-export them so engine
// callers need only one import path.
pub use nodes::{ExecutionMode, LogEntry, LogLevel, RunLogger};
