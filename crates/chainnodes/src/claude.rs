use crate::http::{self, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State};
use serde_json::json;
use std::time::Duration;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const DEFAULT_MAX_TOKENS: u64 = 1024;

/// Anthropic messages call on the user query
pub struct ClaudeNode {
    base_url: String,
    timeout: Duration,
}

impl ClaudeNode {
    pub fn new() -> Self {
        Self {
            base_url: ANTHROPIC_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for ClaudeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for ClaudeNode {
    fn node_type(&self) -> &str {
        "claude"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let api_key = state.api_keys().require_str("anthropic")?;
        let model = ctx.params.get_non_empty_str("model")?.unwrap_or(DEFAULT_MODEL);
        let max_tokens = ctx.params.get_u64("max_tokens")?.unwrap_or(DEFAULT_MAX_TOKENS);

        let client = http::client(self.timeout)?;
        let request = client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": model,
                "max_tokens": max_tokens,
                "messages": [{ "role": "user", "content": state.user_query() }],
            }));

        let response = http::send_json(request, "Anthropic", self.timeout).await?;
        let text = response
            .pointer("/content/0/text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| NodeError::ExecutionFailed("Anthropic response had no text content".to_string()))?
            .to_string();

        state.set_output(text);
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        params.get_str("model")?;
        params.get_u64("max_tokens")?;
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Answer the user query with Claude".to_string(),
            category: "llm".to_string(),
            params: vec![
                ParamDefinition::optional("model", "Model name (default claude-3-opus-20240229)"),
                ParamDefinition::optional("max_tokens", "Token limit (default 1024)"),
            ],
        }
    }
}
