use crate::http;
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, State, Value};
use serde_json::json;
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs the current output to a caller-supplied URL
pub struct WebhookNode {
    timeout: Duration,
}

impl WebhookNode {
    pub fn new() -> Self {
        Self {
            timeout: WEBHOOK_TIMEOUT,
        }
    }
}

impl Default for WebhookNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for WebhookNode {
    fn node_type(&self) -> &str {
        "webhook"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let url = state.api_keys().require_str("webhook_url")?.to_string();

        let payload = json!({
            "output": state
                .current_output
                .as_ref()
                .map(Value::to_json)
                .unwrap_or_else(|| json!("")),
            "metadata": { "workflow_id": state.workflow_id() },
        });

        ctx.events.info(format!("POST {}", url));

        let client = http::client(self.timeout)?;
        let status = http::send_expect_success(client.post(&url).json(&payload), "Webhook", self.timeout)
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Webhook failed: {}", e.detail())))?;

        ctx.events.info(format!("Response status: {}", status));
        state.set_output(format!("Webhook sent to {}", url));
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Send the previous output to api_keys.webhook_url".to_string(),
            category: "http".to_string(),
            params: Vec::new(),
        }
    }
}
