//! Open dispatch table mapping `type` strings to handlers.
//!
//! Adding a node type means registering a handler here — the scheduler
//! never changes. The registry is constructed explicitly per process (or
//! per test) and passed into the engine; there is no module-level table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::NodeHandler;

/// Registry of node handlers keyed by their `type` string.
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// An empty registry. Use [`NodeRegistry::default`] for the built-ins.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own `node_type` key. Replaces any
    /// previously registered handler for the same type.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers
            .insert(handler.node_type().to_string(), handler);
    }

    /// Look up a handler by node type.
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    /// Whether a handler is registered for the given type.
    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// All registered type strings, sorted.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for NodeRegistry {
    /// Registry with every built-in handler family wired in.
    fn default() -> Self {
        let mut registry = Self::empty();

        // Triggers
        registry.register(Arc::new(crate::trigger::WebhookTriggerHandler));
        registry.register(Arc::new(crate::trigger::ManualTriggerHandler));

        // Network
        registry.register(Arc::new(crate::http::HttpRequestHandler::new()));

        // Data
        registry.register(Arc::new(crate::database::DatabaseQueryHandler::new()));

        // AI
        registry.register(Arc::new(crate::ai::AiTaskHandler::new()));
        registry.register(Arc::new(crate::ai::OpenAiChatCompletionHandler::new()));

        // Utility
        registry.register(Arc::new(crate::utility::LogMessageHandler));
        registry.register(Arc::new(crate::utility::ParseJsonHandler));
        registry.register(Arc::new(crate::utility::DelayHandler));
        registry.register(Arc::new(crate::utility::ToUpperCaseHandler));
        registry.register(Arc::new(crate::utility::ToLowerCaseHandler));
        registry.register(Arc::new(crate::utility::ConcatenateStringsHandler));
        registry.register(Arc::new(crate::utility::StringSplitHandler));
        registry.register(Arc::new(crate::utility::FormatDateHandler));

        // Control flow
        registry.register(Arc::new(crate::control::ConditionalBranchHandler));
        registry.register(Arc::new(crate::control::AggregateHandler));
        registry.register(Arc::new(crate::control::ForEachHandler));
        registry.register(Arc::new(crate::control::NoOpHandler));

        // Integrations
        registry.register(Arc::new(crate::integration::SlackPostMessageHandler::new()));
        registry.register(Arc::new(crate::integration::GithubCreateIssueHandler::new()));
        registry.register(Arc::new(crate::integration::SimulatedLiveHandler::new(
            "sendEmail",
            "Email",
        )));
        registry.register(Arc::new(crate::integration::SimulatedLiveHandler::new(
            "googleSheetsAppendRow",
            "Google Sheets",
        )));
        registry.register(Arc::new(crate::integration::SimulatedLiveHandler::new(
            "stripeCreatePaymentLink",
            "Stripe",
        )));
        registry.register(Arc::new(crate::integration::SimulatedLiveHandler::new(
            "hubspotCreateContact",
            "HubSpot",
        )));
        registry.register(Arc::new(crate::integration::SimulatedLiveHandler::new(
            "twilioSendSms",
            "Twilio",
        )));

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHandler;

    #[test]
    fn default_registry_contains_core_types() {
        let registry = NodeRegistry::default();
        for ty in [
            "webhookTrigger",
            "manualTrigger",
            "httpRequest",
            "databaseQuery",
            "aiTask",
            "logMessage",
            "parseJson",
            "conditionalBranch",
            "forEach",
            "slackPostMessage",
        ] {
            assert!(registry.contains(ty), "missing built-in handler '{ty}'");
        }
    }

    #[test]
    fn register_replaces_existing_handler() {
        let mut registry = NodeRegistry::empty();
        registry.register(Arc::new(MockHandler::returning(
            "mock",
            serde_json::json!({"v": 1}),
        )));
        registry.register(Arc::new(MockHandler::returning(
            "mock",
            serde_json::json!({"v": 2}),
        )));
        assert!(registry.contains("mock"));
        assert_eq!(registry.node_types(), vec!["mock"]);
    }

    #[test]
    fn get_unknown_type_is_none() {
        let registry = NodeRegistry::empty();
        assert!(registry.get("nope").is_none());
    }
}
