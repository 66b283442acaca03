//! The `httpRequest` handler.
//!
//! Output shape, identical in live and simulated runs:
//! `{ "response": <parsed body>, "status_code": <u16> }`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{json_or_string, opt_str, require_str};
use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::NodeError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `httpRequest` — performs an HTTP call with method/url/headers/body from
/// config. The `reqwest` client (its own connection pool) is owned by the
/// handler, not the engine.
pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    fn simulate(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let method = opt_str(config, "method").unwrap_or("GET");
        let url = opt_str(config, "url").unwrap_or("<unresolved>");
        ctx.logger.info(format!(
            "HTTP request {}: SIMULATION, would make {method} request to {url}.",
            ctx.identifier()
        ));

        let status_code = crate::config::opt_u64(config, "simulatedStatusCode").unwrap_or(200);
        if !(200..300).contains(&status_code) {
            return Err(NodeError::Retryable(format!(
                "Simulated HTTP error with status {status_code}"
            )));
        }

        let response = json_or_string(config, "simulatedResponse").unwrap_or(Value::Null);
        Ok(json!({ "response": response, "status_code": status_code }))
    }

    async fn live(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let url = require_str(config, "url")?;
        let method_str = opt_str(config, "method").unwrap_or("GET").to_uppercase();
        let method: reqwest::Method = method_str
            .parse()
            .map_err(|_| NodeError::Fatal(format!("unsupported HTTP method '{method_str}'")))?;

        let mut request = self.client.request(method.clone(), url);

        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.header(name, value);
            }
        }

        if matches!(method_str.as_str(), "POST" | "PUT" | "PATCH") {
            match config.get("body") {
                Some(Value::String(s)) => request = request.body(s.clone()),
                Some(Value::Null) | None => {}
                Some(other) => request = request.json(other),
            }
        }

        ctx.logger.info(format!(
            "HTTP request {}: {method_str} {url}",
            ctx.identifier()
        ));

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Retryable(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NodeError::Retryable(format!("failed to read HTTP response body: {e}")))?;

        if !status.is_success() {
            return Err(NodeError::Retryable(format!(
                "HTTP request failed with status {}: {text}",
                status.as_u16()
            )));
        }

        // Non-JSON bodies come back as a plain string.
        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(json!({ "response": parsed, "status_code": status.as_u16() }))
    }
}

impl Default for HttpRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    fn node_type(&self) -> &str {
        "httpRequest"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        if ctx.mode.is_simulation() {
            self.simulate(config, ctx)
        } else {
            self.live(config, ctx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionMode, RunLogger};

    fn ctx() -> HandlerContext {
        HandlerContext {
            node_id: "http_1".into(),
            node_name: "Fetch".into(),
            mode: ExecutionMode::Simulate,
            user_id: "tester".into(),
            logger: RunLogger::new(),
        }
    }

    #[tokio::test]
    async fn simulation_returns_simulated_response() {
        let handler = HttpRequestHandler::new();
        let config = json!({
            "url": "https://api.example.com/things",
            "simulatedResponse": "{\"id\": 42}",
        });
        let out = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["response"], json!({"id": 42}));
        assert_eq!(out["status_code"], 200);
    }

    #[tokio::test]
    async fn simulated_error_status_fails_the_node() {
        let handler = HttpRequestHandler::new();
        let config = json!({
            "url": "https://api.example.com/things",
            "simulatedStatusCode": 503,
        });
        let err = handler.execute(&config, &ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::Retryable(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn simulated_response_object_passes_through() {
        let handler = HttpRequestHandler::new();
        let config = json!({
            "url": "https://api.example.com/things",
            "simulatedResponse": {"nested": {"ok": true}},
            "simulatedStatusCode": 201,
        });
        let out = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["response"]["nested"]["ok"], true);
        assert_eq!(out["status_code"], 201);
    }
}
