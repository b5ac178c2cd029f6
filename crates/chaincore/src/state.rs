use crate::{ApiKeys, NodeParams, NodeParamsMap, Value};
use std::collections::BTreeMap;

/// The record threaded through one pipeline run.
///
/// `user_query`, `api_keys` and `node_params` are fixed at construction and
/// only exposed through shared accessors. Nodes receive `&mut State`, so the
/// node currently running is the only writer of `current_output`.
#[derive(Debug, Clone)]
pub struct State {
    user_query: String,
    api_keys: ApiKeys,
    node_params: NodeParamsMap,
    workflow_id: Option<String>,

    /// Output of the most recently executed node
    pub current_output: Option<Value>,

    /// Failure description written by nodes that fail without signaling
    pub error: Option<String>,

    /// Side metadata recorded by nodes; never read by the engine
    pub extras: BTreeMap<String, Value>,
}

impl State {
    pub fn new(user_query: impl Into<String>, api_keys: ApiKeys, node_params: NodeParamsMap) -> Self {
        Self {
            user_query: user_query.into(),
            api_keys,
            node_params,
            workflow_id: None,
            current_output: None,
            error: None,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn api_keys(&self) -> &ApiKeys {
        &self.api_keys
    }

    /// All per-node option maps. Nodes read their own options from
    /// `NodeContext::params` instead.
    pub fn node_params(&self) -> &NodeParamsMap {
        &self.node_params
    }

    /// Options keyed to `node_id`, or an empty set.
    pub fn params_for(&self, node_id: &str) -> NodeParams {
        self.node_params.get(node_id).cloned().unwrap_or_default()
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub fn set_output(&mut self, output: impl Into<Value>) {
        self.current_output = Some(output.into());
    }

    /// Take ownership of the output, leaving it absent.
    pub fn take_output(&mut self) -> Option<Value> {
        self.current_output.take()
    }

    /// Current output rendered as text, or `None` when absent or blank.
    pub fn output_text(&self) -> Option<String> {
        self.current_output
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn set_extra(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.extras.insert(name.into(), value.into());
    }
}
