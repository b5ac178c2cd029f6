//! Standard node library
//!
//! Built-in nodes for LLM calls, publishing, notifications, databases and
//! document output. [`register_all`] adds every one of them to a registry.

mod claude;
mod database;
mod email;
mod files;
mod gemini;
mod hashnode;
mod http;
mod messaging;
mod openai;
mod pdf;
mod prompt;
mod text;
mod video;
mod webhook;

pub use claude::ClaudeNode;
pub use database::{sql_url, DatabaseNode, DatabaseParams, DbType, Operation};
pub use email::{EmailConfig, EmailNode};
pub use files::{OutputTarget, PdfNode, TextFileNode};
pub use gemini::{GeminiAdvancedNode, GeminiAdvancedParams, GeminiNode};
pub use hashnode::HashnodeNode;
pub use http::DEFAULT_TIMEOUT;
pub use messaging::{SlackNode, WhatsAppNode};
pub use openai::{chat_completion, OpenAiAdvancedNode, OpenAiAdvancedParams, OpenAiNode, OPENAI_BASE_URL};
pub use pdf::{render as render_pdf, wrap as wrap_lines, PdfDocument};
pub use prompt::PromptParts;
pub use text::{TextEdit, TextEditorNode, TextEditorParams, TextFormat};
pub use video::{fetch_transcript, VideoSummaryNode, VideoSummaryParams};
pub use webhook::WebhookNode;

use chaincore::{Node, RegistryError};
use chainruntime::NodeRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// Construction settings for the standard nodes
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    /// Confine the `text` and `pdf` nodes to this directory
    pub output_dir: Option<PathBuf>,
}

/// Every standard node, constructed with its defaults
pub fn standard_nodes() -> Vec<Arc<dyn Node>> {
    standard_nodes_with(&NodeOptions::default())
}

pub fn standard_nodes_with(options: &NodeOptions) -> Vec<Arc<dyn Node>> {
    let (text_file, pdf) = match &options.output_dir {
        Some(dir) => (TextFileNode::confined_to(dir), PdfNode::confined_to(dir)),
        None => (TextFileNode::new(), PdfNode::new()),
    };

    vec![
        Arc::new(OpenAiNode::new()),
        Arc::new(OpenAiAdvancedNode::new()),
        Arc::new(GeminiNode::new()),
        Arc::new(GeminiAdvancedNode::new()),
        Arc::new(ClaudeNode::new()),
        Arc::new(HashnodeNode::new()),
        Arc::new(EmailNode),
        Arc::new(WebhookNode::new()),
        Arc::new(DatabaseNode),
        Arc::new(TextEditorNode),
        Arc::new(text_file),
        Arc::new(pdf),
        Arc::new(WhatsAppNode::new()),
        Arc::new(SlackNode::new()),
        Arc::new(VideoSummaryNode::new()),
    ]
}

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) -> Result<(), RegistryError> {
    for node in standard_nodes() {
        registry.register(node)?;
    }
    Ok(())
}

/// A registry holding exactly the standard nodes
pub fn standard_registry() -> Result<NodeRegistry, RegistryError> {
    NodeRegistry::from_nodes(standard_nodes())
}

pub fn standard_registry_with(options: &NodeOptions) -> Result<NodeRegistry, RegistryError> {
    NodeRegistry::from_nodes(standard_nodes_with(options))
}
