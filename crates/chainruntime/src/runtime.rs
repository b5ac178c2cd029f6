use crate::executor::{ExecutionResult, PipelineExecutor, SoftFailurePolicy};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::registry::NodeRegistry;
use chaincore::{ApiKeys, ChainError, EventBus, NodeParamsMap, State, ValidationError, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One invocation, as accepted over HTTP or from a request file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub node_ids: Vec<String>,
    pub user_query: String,
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub node_params: Option<NodeParamsMap>,
    #[serde(default)]
    pub workflow_id: Option<String>,
}

/// Entry point that validates, runs and extracts a pipeline's output
///
/// Holds no per-run state; concurrent calls each get their own `State`.
pub struct ChainRuntime {
    registry: Arc<NodeRegistry>,
    executor: PipelineExecutor,
    event_bus: Arc<EventBus>,
}

impl ChainRuntime {
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            executor: PipelineExecutor::new(config.soft_failure),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Validate a node sequence without running anything
    pub fn build<S: AsRef<str>>(
        &self,
        node_ids: &[S],
        node_params: Option<&NodeParamsMap>,
    ) -> Result<Pipeline, ValidationError> {
        PipelineBuilder::new(&self.registry).build(node_ids, node_params)
    }

    /// Run `node_ids` in order and return the last node's output.
    ///
    /// Returns `Value::Null` when no node wrote an output.
    pub async fn run_workflow<S: AsRef<str>>(
        &self,
        node_ids: &[S],
        user_query: impl Into<String>,
        api_keys: ApiKeys,
        node_params: Option<NodeParamsMap>,
    ) -> Result<Value, ChainError> {
        let state = State::new(user_query, api_keys, node_params.unwrap_or_default());
        let result = self.execute(node_ids, state).await?;
        Ok(result.final_state.current_output.unwrap_or_default())
    }

    /// Run a full request, honoring its optional workflow id
    pub async fn run_request(&self, request: WorkflowRequest) -> Result<Value, ChainError> {
        let mut state = State::new(
            request.user_query,
            request.api_keys,
            request.node_params.unwrap_or_default(),
        );
        if let Some(workflow_id) = request.workflow_id {
            state = state.with_workflow_id(workflow_id);
        }
        let result = self.execute(&request.node_ids, state).await?;
        Ok(result.final_state.current_output.unwrap_or_default())
    }

    /// Build against the state's own params, then run to completion
    pub async fn execute<S: AsRef<str>>(
        &self,
        node_ids: &[S],
        state: State,
    ) -> Result<ExecutionResult, ChainError> {
        let pipeline = self.build(node_ids, Some(state.node_params()))?;
        let result = self.executor.run(&pipeline, state, &self.event_bus).await?;
        Ok(result)
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<chaincore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    pub soft_failure: SoftFailurePolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            soft_failure: SoftFailurePolicy::Continue,
        }
    }
}
