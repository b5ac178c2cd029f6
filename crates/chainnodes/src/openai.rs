use crate::http::{self, DEFAULT_TIMEOUT};
use crate::prompt::{number_in_range, PromptParts};
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State, Value};
use serde_json::json;
use std::time::Duration;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_ADVANCED_MODEL: &str = "gpt-3.5-turbo";

/// Plain chat completion of the user query
pub struct OpenAiNode {
    base_url: String,
    timeout: Duration,
}

impl OpenAiNode {
    pub fn new() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for OpenAiNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for OpenAiNode {
    fn node_type(&self) -> &str {
        "openai"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let api_key = state.api_keys().require_str("openai")?;
        let model = ctx.params.get_non_empty_str("model")?.unwrap_or(DEFAULT_MODEL);

        ctx.events.info(format!("Requesting completion from {}", model));

        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": state.user_query() }],
        });
        let content = chat_completion(&self.base_url, api_key, &body, self.timeout).await?;

        state.set_output(content);
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        params.get_str("model").map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Answer the user query with an OpenAI chat model".to_string(),
            category: "llm".to_string(),
            params: vec![ParamDefinition::optional("model", "Model name (default gpt-4.1-mini)")],
        }
    }
}

/// Options recognised by `openai/advanced`
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiAdvancedParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub json_mode: bool,
    pub stream: bool,
    pub api_key: Option<String>,
    pub prompt: PromptParts,
}

impl OpenAiAdvancedParams {
    pub fn from_params(params: &NodeParams) -> Result<Self, NodeError> {
        Ok(Self {
            model: params
                .get_non_empty_str("model")?
                .unwrap_or(DEFAULT_ADVANCED_MODEL)
                .to_string(),
            temperature: number_in_range(params, "temperature", 0.0, 2.0)?.unwrap_or(0.7),
            max_tokens: params.get_u64("max_tokens")?,
            top_p: number_in_range(params, "top_p", 0.0, 1.0)?.unwrap_or(1.0),
            frequency_penalty: number_in_range(params, "frequency_penalty", -2.0, 2.0)?.unwrap_or(0.0),
            presence_penalty: number_in_range(params, "presence_penalty", -2.0, 2.0)?.unwrap_or(0.0),
            json_mode: params.get_bool("json_mode")?.unwrap_or(false),
            stream: params.get_bool("stream")?.unwrap_or(false),
            api_key: params.get_non_empty_str("api_key")?.map(str::to_string),
            prompt: PromptParts::from_params(params)?,
        })
    }

    /// Build the chat request body for `user_query`
    pub fn request_body(&self, user_query: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.prompt.system_instruction {
            messages.push(json!({ "role": "system", "content": system }));
        }
        if let Some(context) = &self.prompt.context {
            messages.push(json!({ "role": "assistant", "content": context }));
        }
        let prompt = self.prompt.user_prompt.as_deref().unwrap_or(user_query);
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "frequency_penalty": self.frequency_penalty,
            "presence_penalty": self.presence_penalty,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if self.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

/// Chat completion with model choice, sampling options and prompt pieces
pub struct OpenAiAdvancedNode {
    base_url: String,
    timeout: Duration,
}

impl OpenAiAdvancedNode {
    pub fn new() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for OpenAiAdvancedNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for OpenAiAdvancedNode {
    fn node_type(&self) -> &str {
        "openai/advanced"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let options = OpenAiAdvancedParams::from_params(&ctx.params)?;

        let api_key = match state.api_keys().get_str("openai") {
            Some(key) => key.to_string(),
            None => options
                .api_key
                .clone()
                .ok_or_else(|| NodeError::MissingCredential("openai".to_string()))?,
        };

        if options.stream {
            ctx.events.info("Streaming requested; collecting the full response");
        }

        let body = options.request_body(state.user_query());
        match chat_completion(&self.base_url, &api_key, &body, self.timeout).await {
            Ok(content) => {
                state.set_extra("llm_metadata", json_metadata(&options.model, options.json_mode));
                state.set_output(content);
                Ok(())
            }
            Err(e) => {
                state.set_error(format!("OpenAI Error: {}", e));
                Err(e)
            }
        }
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        OpenAiAdvancedParams::from_params(params).map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "OpenAI chat completion with extended options".to_string(),
            category: "llm".to_string(),
            params: vec![
                ParamDefinition::optional("model", "Model name (default gpt-3.5-turbo)"),
                ParamDefinition::optional("temperature", "Sampling temperature, 0 to 2"),
                ParamDefinition::optional("max_tokens", "Completion token limit"),
                ParamDefinition::optional("top_p", "Nucleus sampling, 0 to 1"),
                ParamDefinition::optional("frequency_penalty", "-2 to 2"),
                ParamDefinition::optional("presence_penalty", "-2 to 2"),
                ParamDefinition::optional("system_instruction", "System message"),
                ParamDefinition::optional("context", "Extra context sent before the prompt"),
                ParamDefinition::optional("user_prompt", "Prompt overriding the user query"),
                ParamDefinition::optional("json_mode", "Ask for a JSON object response"),
                ParamDefinition::optional("stream", "Accepted; the response is always collected whole"),
                ParamDefinition::optional("api_key", "Fallback key when api_keys.openai is absent"),
            ],
        }
    }
}

fn json_metadata(model: &str, json_mode: bool) -> Value {
    Value::Object(
        [
            ("provider".to_string(), Value::from("openai")),
            ("model".to_string(), Value::from(model)),
            ("json_mode".to_string(), Value::from(json_mode)),
        ]
        .into_iter()
        .collect(),
    )
}

/// POST a chat completion and return the first choice's content
pub async fn chat_completion(
    base_url: &str,
    api_key: &str,
    body: &serde_json::Value,
    timeout: Duration,
) -> Result<String, NodeError> {
    let client = http::client(timeout)?;
    let request = client
        .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
        .bearer_auth(api_key)
        .json(body);

    let response = http::send_json(request, "OpenAI", timeout).await?;

    response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| NodeError::ExecutionFailed("OpenAI response had no message content".to_string()))
}
