//! `MockHandler` — a test double for `NodeHandler`.
//!
//! Useful in unit and integration tests where a real handler is either
//! unavailable or irrelevant (and in retry tests, where failure counts
//! must be scripted exactly).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::NodeError;

/// Behaviour injected into `MockHandler` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with a `Retryable` error until the Nth call, then return the value.
    SucceedAfter(usize, Value, String),
}

/// A mock handler that records every call it receives and returns a
/// programmer-specified result.
pub struct MockHandler {
    /// Registered `type` string.
    pub type_name: String,
    /// What the handler will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All resolved configs seen by this handler (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockHandler {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(type_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(type_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that fails with a `Retryable` error on the first
    /// `failures` calls, then succeeds with `value`.
    pub fn succeeding_after(
        type_name: impl Into<String>,
        failures: usize,
        value: Value,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            behaviour: MockBehaviour::SucceedAfter(failures, value, msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this handler has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Shared handle onto the call log, for assertions after the handler
    /// has been moved into a registry.
    pub fn calls_handle(&self) -> Arc<Mutex<Vec<Value>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl NodeHandler for MockHandler {
    fn node_type(&self) -> &str {
        &self.type_name
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(config.clone());
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
            MockBehaviour::SucceedAfter(failures, value, msg) => {
                if call_index <= *failures {
                    Err(NodeError::Retryable(msg.clone()))
                } else {
                    Ok(value.clone())
                }
            }
        }
    }
}
