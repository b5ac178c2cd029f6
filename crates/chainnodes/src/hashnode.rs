use crate::http::{self, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State};
use serde_json::json;
use std::time::Duration;

const HASHNODE_GRAPHQL_URL: &str = "https://gql.hashnode.com";

const CREATE_DRAFT: &str = r#"
mutation CreateDraft($input: CreateDraftInput!) {
  createDraft(input: $input) {
    draft {
      id
      title
    }
  }
}
"#;

/// Publishes the current output as a Hashnode draft
pub struct HashnodeNode {
    endpoint: String,
    timeout: Duration,
}

impl HashnodeNode {
    pub fn new() -> Self {
        Self {
            endpoint: HASHNODE_GRAPHQL_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for HashnodeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for HashnodeNode {
    fn node_type(&self) -> &str {
        "hashnode"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let content = state
            .output_text()
            .ok_or_else(|| NodeError::MissingInput("No content to publish from previous node".to_string()))?;

        let token = state.api_keys().require_str("hashnode_token")?;
        let publication_id = state.api_keys().require_str("hashnode_publication_id")?;
        let title = ctx.params.get_non_empty_str("title")?.unwrap_or("AI Generated Post");
        let slug = ctx.params.get_non_empty_str("slug")?.unwrap_or("ai-generated-post");

        let client = http::client(self.timeout)?;
        let request = client
            .post(&self.endpoint)
            .header("Authorization", token)
            .json(&json!({
                "query": CREATE_DRAFT,
                "variables": {
                    "input": {
                        "title": title,
                        "contentMarkdown": content,
                        "publicationId": publication_id,
                        "slug": slug,
                    }
                }
            }));

        let result = http::send_json(request, "Hashnode", self.timeout).await?;
        if let Some(errors) = result.get("errors") {
            return Err(NodeError::ExecutionFailed(format!("Hashnode GraphQL error: {}", errors)));
        }

        let draft = result
            .pointer("/data/createDraft/draft")
            .ok_or_else(|| NodeError::ExecutionFailed("Hashnode response had no draft".to_string()))?;
        let draft_id = draft.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        let draft_title = draft.get("title").and_then(|v| v.as_str()).unwrap_or(title);

        let message = format!(
            "Draft '{}' created successfully on Hashnode with ID: {}",
            draft_title, draft_id
        );
        ctx.events.info(message.clone());
        state.set_output(message);
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        params.get_str("title")?;
        params.get_str("slug")?;
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Publish the previous output as a Hashnode draft".to_string(),
            category: "publishing".to_string(),
            params: vec![
                ParamDefinition::optional("title", "Draft title"),
                ParamDefinition::optional("slug", "Draft slug"),
            ],
        }
    }
}
