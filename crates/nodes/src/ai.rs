//! AI handlers — prompt-based nodes backed by an OpenAI-compatible chat
//! completion endpoint.
//!
//! The API key reaches the handler through a resolved config field (bound
//! via `{{credential.*}}` or `{{env.*}}`); the handler never reads process
//! environment itself.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{json_or_string, opt_str, require_str};
use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::NodeError;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const AI_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn ai_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(AI_REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

async fn chat_completion(
    client: &reqwest::Client,
    api_base: &str,
    api_key: &str,
    model: &str,
    messages: Value,
) -> Result<Value, NodeError> {
    let response = client
        .post(format!("{}/chat/completions", api_base.trim_end_matches('/')))
        .bearer_auth(api_key)
        .json(&json!({ "model": model, "messages": messages }))
        .send()
        .await
        .map_err(|e| NodeError::Retryable(format!("AI request failed: {e}")))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| NodeError::Retryable(format!("failed to read AI response: {e}")))?;

    if !status.is_success() {
        let detail = body["error"]["message"]
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
        return Err(NodeError::Retryable(format!("AI API error: {detail}")));
    }

    Ok(body)
}

// ---------------------------------------------------------------------------
// aiTask
// ---------------------------------------------------------------------------

/// `aiTask` — a single prompt in, completion text out.
///
/// Output shape: `{ "output": <completion text> }`.
pub struct AiTaskHandler {
    client: reqwest::Client,
}

impl AiTaskHandler {
    pub fn new() -> Self {
        Self {
            client: ai_client(),
        }
    }
}

impl Default for AiTaskHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for AiTaskHandler {
    fn node_type(&self) -> &str {
        "aiTask"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let model = opt_str(config, "model").unwrap_or(DEFAULT_MODEL);

        if ctx.mode.is_simulation() {
            ctx.logger.info(format!(
                "AI task {}: SIMULATION, would send prompt to model {model}.",
                ctx.identifier()
            ));
            let output = json_or_string(config, "simulatedOutput")
                .unwrap_or_else(|| Value::String("Simulated AI output.".into()));
            return Ok(json!({ "output": output }));
        }

        let api_key = require_str(config, "apiKey").map_err(|_| {
            NodeError::Fatal(
                "AI API key is not configured or resolved; bind it via \
                 {{credential.OpenAIKey}} in the 'apiKey' field"
                    .into(),
            )
        })?;
        let prompt = require_str(config, "prompt")?;
        let api_base = opt_str(config, "apiBase").unwrap_or(DEFAULT_API_BASE);

        let body = chat_completion(
            &self.client,
            api_base,
            api_key,
            model,
            json!([{ "role": "user", "content": prompt }]),
        )
        .await?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(json!({ "output": text }))
    }
}

// ---------------------------------------------------------------------------
// openAiChatCompletion
// ---------------------------------------------------------------------------

/// `openAiChatCompletion` — full messages array in, raw API response out.
///
/// Output shape: `{ "output": <chat completion response object> }`.
pub struct OpenAiChatCompletionHandler {
    client: reqwest::Client,
}

impl OpenAiChatCompletionHandler {
    pub fn new() -> Self {
        Self {
            client: ai_client(),
        }
    }
}

impl Default for OpenAiChatCompletionHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for OpenAiChatCompletionHandler {
    fn node_type(&self) -> &str {
        "openAiChatCompletion"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let model = opt_str(config, "model").unwrap_or(DEFAULT_MODEL);

        if ctx.mode.is_simulation() {
            ctx.logger.info(format!(
                "OpenAI chat {}: SIMULATION, would send messages to model {model}.",
                ctx.identifier()
            ));
            let output = json_or_string(config, "simulated_config").unwrap_or(Value::Null);
            return Ok(json!({ "output": output }));
        }

        let api_key = require_str(config, "apiKey").map_err(|_| {
            NodeError::Fatal(
                "OpenAI API key is not configured or resolved; bind it via \
                 {{credential.OpenAIKey}} in the 'apiKey' field"
                    .into(),
            )
        })?;

        let messages = json_or_string(config, "messages")
            .filter(|m| m.is_array())
            .ok_or_else(|| NodeError::Fatal("'messages' must be an array of chat messages".into()))?;

        let body = chat_completion(&self.client, DEFAULT_API_BASE, api_key, model, messages).await?;
        Ok(json!({ "output": body }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionMode, RunLogger};

    fn ctx() -> HandlerContext {
        HandlerContext {
            node_id: "ai_1".into(),
            node_name: "Summarise".into(),
            mode: ExecutionMode::Simulate,
            user_id: "tester".into(),
            logger: RunLogger::new(),
        }
    }

    #[tokio::test]
    async fn ai_task_simulation_returns_simulated_output() {
        let handler = AiTaskHandler::new();
        let config = json!({ "prompt": "say hi", "simulatedOutput": "hi there" });
        let out = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["output"], "hi there");
    }

    #[tokio::test]
    async fn ai_task_simulation_default_output() {
        let handler = AiTaskHandler::new();
        let out = handler.execute(&json!({}), &ctx()).await.unwrap();
        assert_eq!(out["output"], "Simulated AI output.");
    }

    #[tokio::test]
    async fn chat_completion_simulation_passes_config_through() {
        let handler = OpenAiChatCompletionHandler::new();
        let config = json!({
            "messages": [{"role": "user", "content": "hello"}],
            "simulated_config": {"choices": [{"message": {"content": "hey"}}]},
        });
        let out = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["output"]["choices"][0]["message"]["content"], "hey");
    }
}
