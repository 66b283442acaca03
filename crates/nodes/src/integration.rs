//! Third-party integration handlers.
//!
//! `slackPostMessage` and `githubCreateIssue` make real API calls in live
//! mode. Integrations whose live path would require a full OAuth2 grant
//! (sheets, payments, CRM, SMS, email) run through [`SimulatedLiveHandler`]:
//! they return their `simulated_config` in both modes, with a log marker in
//! live mode, so workflows that use them keep executing end to end.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{json_or_string, require_str};
use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::NodeError;

const INTEGRATION_TIMEOUT: Duration = Duration::from_secs(30);

fn integration_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(INTEGRATION_TIMEOUT)
        .build()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// slackPostMessage
// ---------------------------------------------------------------------------

/// `slackPostMessage` — posts `text` to `channel` via the Slack Web API.
/// The bot token arrives resolved in config (`{{credential.SlackBotToken}}`).
///
/// Output shape: `{ "output": <Slack API response> }`.
pub struct SlackPostMessageHandler {
    client: reqwest::Client,
}

impl SlackPostMessageHandler {
    pub fn new() -> Self {
        Self {
            client: integration_client(),
        }
    }
}

impl Default for SlackPostMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for SlackPostMessageHandler {
    fn node_type(&self) -> &str {
        "slackPostMessage"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        if ctx.mode.is_simulation() {
            let channel = crate::config::opt_str(config, "channel").unwrap_or("<unresolved>");
            ctx.logger.info(format!(
                "Slack {}: SIMULATION, would post message to channel {channel}.",
                ctx.identifier()
            ));
            let output = json_or_string(config, "simulated_config")
                .unwrap_or_else(|| json!({ "ok": true, "message": { "ts": "simulated_timestamp" } }));
            return Ok(json!({ "output": output }));
        }

        let token = require_str(config, "token").map_err(|_| {
            NodeError::Fatal(
                "Slack bot token is not configured or resolved; bind it via \
                 {{credential.SlackBotToken}} in the 'token' field"
                    .into(),
            )
        })?;
        let channel = require_str(config, "channel")?;
        let text = require_str(config, "text")?;

        let response = self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(|e| NodeError::Retryable(format!("Slack request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| NodeError::Retryable(format!("failed to read Slack response: {e}")))?;

        if !status.is_success() || body["ok"] != json!(true) {
            let detail = body["error"]
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
            return Err(NodeError::Retryable(format!("Slack API error: {detail}")));
        }

        Ok(json!({ "output": body }))
    }
}

// ---------------------------------------------------------------------------
// githubCreateIssue
// ---------------------------------------------------------------------------

/// `githubCreateIssue` — opens an issue in `owner`/`repo` with
/// `title`/`body`. Token arrives resolved (`{{credential.GitHubToken}}`).
///
/// Output shape: `{ "output": <GitHub API response> }`.
pub struct GithubCreateIssueHandler {
    client: reqwest::Client,
}

impl GithubCreateIssueHandler {
    pub fn new() -> Self {
        Self {
            client: integration_client(),
        }
    }
}

impl Default for GithubCreateIssueHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for GithubCreateIssueHandler {
    fn node_type(&self) -> &str {
        "githubCreateIssue"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let owner = crate::config::opt_str(config, "owner").unwrap_or("<unresolved>");
        let repo = crate::config::opt_str(config, "repo").unwrap_or("<unresolved>");

        if ctx.mode.is_simulation() {
            ctx.logger.info(format!(
                "GitHub {}: SIMULATION, would create issue in {owner}/{repo}.",
                ctx.identifier()
            ));
            let output = json_or_string(config, "simulated_config").unwrap_or(Value::Null);
            return Ok(json!({ "output": output }));
        }

        let token = require_str(config, "token").map_err(|_| {
            NodeError::Fatal(
                "GitHub token is not configured or resolved; bind it via \
                 {{credential.GitHubToken}} in the 'token' field"
                    .into(),
            )
        })?;
        let title = require_str(config, "title")?;
        let body = crate::config::opt_str(config, "body").unwrap_or("");

        let url = format!("https://api.github.com/repos/{owner}/{repo}/issues");
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "flowmill")
            .header("Authorization", format!("token {token}"))
            .json(&json!({ "title": title, "body": body }))
            .send()
            .await
            .map_err(|e| NodeError::Retryable(format!("GitHub request failed: {e}")))?;

        let status = response.status();
        let response_body: Value = response
            .json()
            .await
            .map_err(|e| NodeError::Retryable(format!("failed to read GitHub response: {e}")))?;

        if !status.is_success() {
            let detail = response_body["message"]
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
            return Err(NodeError::Retryable(format!("GitHub API error: {detail}")));
        }

        Ok(json!({ "output": response_body }))
    }
}

// ---------------------------------------------------------------------------
// Simulated-live adapters
// ---------------------------------------------------------------------------

/// Adapter for integrations whose live path needs an OAuth2 grant that is
/// out of scope here. Returns `simulated_config` in both modes; live runs
/// get a log marker and a warning when no credential placeholder is bound,
/// so the gap is visible instead of silent.
pub struct SimulatedLiveHandler {
    type_name: &'static str,
    service_name: &'static str,
}

impl SimulatedLiveHandler {
    pub fn new(type_name: &'static str, service_name: &'static str) -> Self {
        Self {
            type_name,
            service_name,
        }
    }
}

#[async_trait]
impl NodeHandler for SimulatedLiveHandler {
    fn node_type(&self) -> &str {
        self.type_name
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        if ctx.mode.is_simulation() {
            ctx.logger.info(format!(
                "{} {}: SIMULATION, returning simulated data.",
                self.service_name,
                ctx.identifier()
            ));
        } else {
            ctx.logger.info(format!(
                "{} {}: LIVE (SIMULATED). This integration requires OAuth2, which is not \
                 implemented; returning simulated data for workflow continuity.",
                self.service_name,
                ctx.identifier()
            ));

            if config.get("simulated_config").is_none() {
                ctx.logger.info(format!(
                    "{} {}: WARNING, no simulated_config provided; downstream nodes \
                     will observe an empty object.",
                    self.service_name,
                    ctx.identifier()
                ));
            }
        }

        let output = json_or_string(config, "simulated_config").unwrap_or_else(|| json!({}));
        Ok(json!({ "output": output }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionMode, RunLogger};

    fn ctx(mode: ExecutionMode) -> HandlerContext {
        HandlerContext {
            node_id: "int_1".into(),
            node_name: "Notify".into(),
            mode,
            user_id: "tester".into(),
            logger: RunLogger::new(),
        }
    }

    #[tokio::test]
    async fn slack_simulation_default_shape() {
        let handler = SlackPostMessageHandler::new();
        let out = handler
            .execute(&json!({ "channel": "#ops" }), &ctx(ExecutionMode::Simulate))
            .await
            .unwrap();
        assert_eq!(out["output"]["ok"], true);
        assert_eq!(out["output"]["message"]["ts"], "simulated_timestamp");
    }

    #[tokio::test]
    async fn github_simulation_returns_simulated_config() {
        let handler = GithubCreateIssueHandler::new();
        let config = json!({
            "owner": "acme",
            "repo": "widgets",
            "simulated_config": {"number": 12},
        });
        let out = handler
            .execute(&config, &ctx(ExecutionMode::Simulate))
            .await
            .unwrap();
        assert_eq!(out["output"]["number"], 12);
    }

    #[tokio::test]
    async fn simulated_live_warns_without_simulated_config() {
        let handler = SimulatedLiveHandler::new("twilioSendSms", "Twilio");
        let context = ctx(ExecutionMode::Live);
        let out = handler
            .execute(&json!({ "to": "+15551234" }), &context)
            .await
            .unwrap();
        assert_eq!(out["output"], json!({}));
        let logs = context.logger.snapshot();
        assert!(logs.iter().any(|l| l.message.contains("WARNING")));
    }
}
