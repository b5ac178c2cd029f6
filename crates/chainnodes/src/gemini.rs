use crate::http::{self, DEFAULT_TIMEOUT};
use crate::prompt::{number_in_range, PromptParts};
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State, Value};
use serde_json::json;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_ADVANCED_MODEL: &str = "gemini-1.5-flash";

pub const SUPPORTED_MODELS: &[&str] = &[
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-pro",
];

/// Plain Gemini generation of the user query
pub struct GeminiNode {
    base_url: String,
    timeout: Duration,
}

impl GeminiNode {
    pub fn new() -> Self {
        Self {
            base_url: GEMINI_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for GeminiNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for GeminiNode {
    fn node_type(&self) -> &str {
        "gemini"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let api_key = state.api_keys().require_str("gemini")?;

        ctx.events.info(format!("Requesting generation from {}", DEFAULT_MODEL));

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": state.user_query() }] }],
            "generationConfig": { "temperature": 0.7 },
        });
        let response = generate_content(&self.base_url, DEFAULT_MODEL, api_key, &body, self.timeout).await?;
        let text = response_text(&response)?;

        state.set_output(text);
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Answer the user query with Gemini".to_string(),
            category: "llm".to_string(),
            params: Vec::new(),
        }
    }
}

/// Options recognised by `gemini/advanced`
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiAdvancedParams {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: Option<u64>,
    pub prompt: PromptParts,
}

impl GeminiAdvancedParams {
    pub fn from_params(params: &NodeParams) -> Result<Self, NodeError> {
        let model = params
            .get_non_empty_str("model")?
            .unwrap_or(DEFAULT_ADVANCED_MODEL);
        if !SUPPORTED_MODELS.contains(&model) {
            return Err(NodeError::invalid_param(
                "model",
                format!("unsupported model, choose from: {}", SUPPORTED_MODELS.join(", ")),
            ));
        }

        Ok(Self {
            model: model.to_string(),
            temperature: number_in_range(params, "temperature", 0.0, 2.0)?.unwrap_or(0.7),
            max_output_tokens: params.get_u64("max_output_tokens")?,
            prompt: PromptParts::from_params(params)?,
        })
    }

    pub fn request_body(&self, user_query: &str) -> serde_json::Value {
        let mut prompt = self.prompt.user_prompt.as_deref().unwrap_or(user_query).to_string();
        if let Some(context) = &self.prompt.context {
            prompt = format!("Context: {}\n\nQuestion: {}", context, prompt);
        }

        let mut generation_config = json!({ "temperature": self.temperature });
        if let Some(max) = self.max_output_tokens {
            generation_config["maxOutputTokens"] = json!(max);
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });
        if let Some(system) = &self.prompt.system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

/// Gemini generation with model choice, sampling options and prompt pieces
pub struct GeminiAdvancedNode {
    base_url: String,
    timeout: Duration,
}

impl GeminiAdvancedNode {
    pub fn new() -> Self {
        Self {
            base_url: GEMINI_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for GeminiAdvancedNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for GeminiAdvancedNode {
    fn node_type(&self) -> &str {
        "gemini/advanced"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let options = GeminiAdvancedParams::from_params(&ctx.params)?;
        let api_key = state.api_keys().require_str("gemini")?.to_string();

        let body = options.request_body(state.user_query());
        let outcome = match generate_content(&self.base_url, &options.model, &api_key, &body, self.timeout).await {
            Ok(response) => response_text(&response).map(|text| (text, response)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((text, response)) => {
                let mut metadata = std::collections::BTreeMap::new();
                metadata.insert("provider".to_string(), Value::from("gemini"));
                metadata.insert("model".to_string(), Value::from(options.model.as_str()));
                if let Some(usage) = response.get("usageMetadata") {
                    metadata.insert("usage".to_string(), Value::from(usage.clone()));
                }
                state.set_extra("llm_metadata", Value::Object(metadata));
                state.set_output(text);
                Ok(())
            }
            Err(e) => {
                state.set_error(format!("Gemini API error: {}", e));
                Err(e)
            }
        }
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        GeminiAdvancedParams::from_params(params).map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Gemini generation with extended options".to_string(),
            category: "llm".to_string(),
            params: vec![
                ParamDefinition::optional("model", "One of the supported Gemini models"),
                ParamDefinition::optional("temperature", "Sampling temperature, 0 to 2"),
                ParamDefinition::optional("max_output_tokens", "Output token limit"),
                ParamDefinition::optional("system_instruction", "System instruction"),
                ParamDefinition::optional("context", "Context prepended to the question"),
                ParamDefinition::optional("user_prompt", "Prompt overriding the user query"),
            ],
        }
    }
}

async fn generate_content(
    base_url: &str,
    model: &str,
    api_key: &str,
    body: &serde_json::Value,
    timeout: Duration,
) -> Result<serde_json::Value, NodeError> {
    let client = http::client(timeout)?;
    let request = client
        .post(format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        ))
        .query(&[("key", api_key)])
        .json(body);

    http::send_json(request, "Gemini", timeout).await
}

/// Concatenate the text parts of the first candidate
fn response_text(response: &serde_json::Value) -> Result<String, NodeError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| NodeError::ExecutionFailed("Gemini response had no candidates".to_string()))?;

    Ok(parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}
