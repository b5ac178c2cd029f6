use crate::http::{self, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State};
use serde_json::json;
use std::time::Duration;

const TWILIO_BASE_URL: &str = "https://api.twilio.com/2010-04-01";
const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Sends the current output over WhatsApp through Twilio.
///
/// The output passes through unchanged; the delivery status is recorded in
/// `extras["whatsapp_status"]`.
pub struct WhatsAppNode {
    base_url: String,
    timeout: Duration,
}

impl WhatsAppNode {
    pub fn new() -> Self {
        Self {
            base_url: TWILIO_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for WhatsAppNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for WhatsAppNode {
    fn node_type(&self) -> &str {
        "whatsapp"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let sid = state.api_keys().require_str("twilio_sid")?;
        let token = state.api_keys().require_str("twilio_token")?;
        let to_number = ctx.params.require_str("to_number")?;
        let from_number = match ctx.params.get_non_empty_str("from_number")? {
            Some(number) => number,
            None => state.api_keys().require_str("twilio_whatsapp_from")?,
        };
        let body = state.output_text().unwrap_or_default();

        let client = http::client(self.timeout)?;
        let request = client
            .post(format!(
                "{}/Accounts/{}/Messages.json",
                self.base_url.trim_end_matches('/'),
                sid
            ))
            .basic_auth(sid, Some(token))
            .form(&[
                ("From", format!("whatsapp:{}", from_number)),
                ("To", format!("whatsapp:{}", to_number)),
                ("Body", body),
            ]);

        let response = http::send_json(request, "Twilio", self.timeout).await?;
        let status = response
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string();

        ctx.events.info(format!("WhatsApp message to {} is {}", to_number, status));
        state.set_extra("whatsapp_status", status);
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        params.require_str("to_number")?;
        params.get_str("from_number")?;
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Send the previous output as a WhatsApp message via Twilio".to_string(),
            category: "notification".to_string(),
            params: vec![
                ParamDefinition::required("to_number", "Recipient phone number"),
                ParamDefinition::optional(
                    "from_number",
                    "Sender number; falls back to api_keys.twilio_whatsapp_from",
                ),
            ],
        }
    }
}

/// Posts a message to a Slack channel.
///
/// Sends `message` when given, else the current output, which passes
/// through unchanged.
pub struct SlackNode {
    endpoint: String,
    timeout: Duration,
}

impl SlackNode {
    pub fn new() -> Self {
        Self {
            endpoint: SLACK_POST_MESSAGE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for SlackNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for SlackNode {
    fn node_type(&self) -> &str {
        "slack"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let token = state.api_keys().require_str("slack")?;
        let channel = ctx.params.require_str("channel")?;
        let text = match ctx.params.get_non_empty_str("message")? {
            Some(message) => message.to_string(),
            None => state
                .output_text()
                .ok_or_else(|| NodeError::MissingInput("No message to post".to_string()))?,
        };

        let client = http::client(self.timeout)?;
        let request = client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&json!({ "channel": channel, "text": text }));

        let response = http::send_json(request, "Slack", self.timeout).await?;
        if response.get("ok").and_then(|ok| ok.as_bool()) != Some(true) {
            let reason = response
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            return Err(NodeError::ExecutionFailed(format!("Slack rejected message: {}", reason)));
        }

        if let Some(ts) = response.get("ts").and_then(|ts| ts.as_str()) {
            state.set_extra("slack_ts", ts);
        }
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        params.require_str("channel")?;
        params.get_str("message")?;
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Post a message to a Slack channel".to_string(),
            category: "notification".to_string(),
            params: vec![
                ParamDefinition::required("channel", "Channel id or name"),
                ParamDefinition::optional("message", "Text to send instead of the previous output"),
            ],
        }
    }
}
