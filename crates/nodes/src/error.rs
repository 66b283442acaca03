//! Node-level error type.

use thiserror::Error;

/// Errors returned by a handler's `execute` method.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` — the attempt is repeated per the node's retry policy.
/// - `Fatal`     — the node is immediately marked as failed.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Transient failure (network error, timeout, 5xx response).
    #[error("retryable node error: {0}")]
    Retryable(String),

    /// Permanent failure (bad configuration, invalid input shape).
    #[error("fatal node error: {0}")]
    Fatal(String),
}

impl NodeError {
    /// Shorthand for a `Retryable` error built from any displayable cause.
    pub fn retryable(msg: impl std::fmt::Display) -> Self {
        Self::Retryable(msg.to_string())
    }

    /// Shorthand for a `Fatal` error built from any displayable cause.
    pub fn fatal(msg: impl std::fmt::Display) -> Self {
        Self::Fatal(msg.to_string())
    }
}
