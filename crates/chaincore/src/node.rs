use crate::{events::EventEmitter, NodeError, NodeParams, State};
use async_trait::async_trait;
use serde::Serialize;

/// Core trait that all pipeline nodes implement
///
/// A node reads `user_query`, `api_keys` and `current_output` from the
/// state plus its own bound parameters, and records its result in
/// `current_output`. Failures are signaled by returning `Err`; a node may
/// instead record a failure in `State::error` and return `Ok`, in which case
/// the executor's soft-failure policy decides whether the chain continues.
#[async_trait]
pub trait Node: Send + Sync {
    /// Registry identifier (e.g. "openai", "gemini/advanced")
    fn node_type(&self) -> &str;

    /// Run the node once against the shared state
    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError>;

    /// Validate bound parameters at pipeline build time
    fn validate_params(&self, _params: &NodeParams) -> Result<(), NodeError> {
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Per-step context passed to a node alongside the state
#[derive(Clone)]
pub struct NodeContext {
    /// Identifier the node was requested under
    pub node_id: String,

    /// Zero-based position in the pipeline
    pub position: usize,

    /// Options bound to this node only
    pub params: NodeParams,

    /// Event emitter for progress updates
    pub events: EventEmitter,
}

impl NodeContext {
    pub fn new(node_id: impl Into<String>, position: usize, params: NodeParams, events: EventEmitter) -> Self {
        Self {
            node_id: node_id.into(),
            position,
            params,
            events,
        }
    }

    /// Context for running a node on its own, outside a pipeline
    pub fn standalone(node_id: impl Into<String>, params: NodeParams) -> Self {
        let node_id = node_id.into();
        let events = EventEmitter::detached(node_id.clone());
        Self::new(node_id, 0, params, events)
    }
}

/// Descriptive metadata about a node type
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
    pub params: Vec<ParamDefinition>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ParamDefinition {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}
