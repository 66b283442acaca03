//! The `NodeHandler` trait — the contract every node type must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::HandlerContext;
use crate::NodeError;

/// The core handler trait.
///
/// Handlers receive their node's *fully resolved* configuration (every
/// placeholder already substituted by the engine) plus a [`HandlerContext`]
/// carrying the execution mode and the shared log sink. They return the
/// node's output object.
///
/// Handlers that perform external side effects must honour the simulation
/// contract: when `ctx.mode` is [`Simulate`](crate::ExecutionMode::Simulate),
/// skip the real call and return the value found in the node's `simulated*`
/// config field, shaped identically to the live result.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The `type` string this handler is registered under.
    fn node_type(&self) -> &str;

    /// Execute the node and return its output.
    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError>;
}
