//! Trigger handlers — entry points of a workflow graph.
//!
//! Live trigger data arrives through `initialData` seeding, which bypasses
//! the handler entirely. When a trigger node executes without a seed it
//! falls back to the simulated request data in its config, so a canvas
//! "Run" works in both modes without a real inbound request.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::json_or_string;
use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::{ExecutionMode, NodeError};

/// `webhookTrigger` — surfaces an inbound HTTP request as node output.
pub struct WebhookTriggerHandler;

#[async_trait]
impl NodeHandler for WebhookTriggerHandler {
    fn node_type(&self) -> &str {
        "webhookTrigger"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        if ctx.mode == ExecutionMode::Live {
            ctx.logger.info(format!(
                "Webhook trigger {}: no live request data was seeded; using simulated request data.",
                ctx.identifier()
            ));
        }

        let body = json_or_string(config, "simulatedRequestBody").unwrap_or_else(|| json!({}));
        let headers = json_or_string(config, "simulatedRequestHeaders").unwrap_or_else(|| json!({}));
        let query = json_or_string(config, "simulatedRequestQuery").unwrap_or_else(|| json!({}));

        Ok(json!({
            "requestBody": body,
            "requestHeaders": headers,
            "requestQuery": query,
            "status": "success",
        }))
    }
}

/// `manualTrigger` — started directly by the caller; carries no payload of
/// its own beyond whatever `initialData` seeds onto it.
pub struct ManualTriggerHandler;

#[async_trait]
impl NodeHandler for ManualTriggerHandler {
    fn node_type(&self) -> &str {
        "manualTrigger"
    }

    async fn execute(&self, _config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        Ok(json!({ "status": "success" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunLogger;

    fn ctx(mode: ExecutionMode) -> HandlerContext {
        HandlerContext {
            node_id: "trigger_1".into(),
            node_name: "Webhook".into(),
            mode,
            user_id: "tester".into(),
            logger: RunLogger::new(),
        }
    }

    #[tokio::test]
    async fn webhook_trigger_uses_simulated_request_data() {
        let config = json!({
            "simulatedRequestBody": "{\"order\": 7}",
            "simulatedRequestHeaders": {"x-test": "1"},
        });
        let out = WebhookTriggerHandler
            .execute(&config, &ctx(ExecutionMode::Simulate))
            .await
            .unwrap();

        assert_eq!(out["requestBody"], json!({"order": 7}));
        assert_eq!(out["requestHeaders"], json!({"x-test": "1"}));
        assert_eq!(out["requestQuery"], json!({}));
        assert_eq!(out["status"], "success");
    }

    #[tokio::test]
    async fn webhook_trigger_live_without_seed_falls_back() {
        let context = ctx(ExecutionMode::Live);
        let out = WebhookTriggerHandler
            .execute(&json!({}), &context)
            .await
            .unwrap();
        assert_eq!(out["requestBody"], json!({}));
        assert_eq!(context.logger.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn manual_trigger_reports_success() {
        let out = ManualTriggerHandler
            .execute(&json!({}), &ctx(ExecutionMode::Simulate))
            .await
            .unwrap();
        assert_eq!(out["status"], "success");
    }
}
