use crate::registry::NodeRegistry;
use chaincore::{Node, NodeParams, NodeParamsMap, ValidationError};
use std::sync::Arc;

/// One bound position in a pipeline
#[derive(Clone)]
pub struct PipelineStep {
    pub node_id: String,
    pub position: usize,
    pub node: Arc<dyn Node>,
    pub params: NodeParams,
}

/// Validated, ordered node list ready to run
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Node identifiers in execution order
    pub fn node_sequence(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.node_id.as_str()).collect()
    }

    pub fn bound_params(&self, position: usize) -> Option<&NodeParams> {
        self.steps.get(position).map(|s| &s.params)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a built pipeline
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("node_sequence", &self.node_sequence())
            .finish()
    }
}

/// Validates a requested node sequence and binds per-node parameters
pub struct PipelineBuilder<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self { registry }
    }

    /// Resolve every identifier before binding anything; the first unknown
    /// identifier fails the whole build.
    pub fn build<S: AsRef<str>>(
        &self,
        node_ids: &[S],
        node_params: Option<&NodeParamsMap>,
    ) -> Result<Pipeline, ValidationError> {
        if node_ids.is_empty() {
            return Err(ValidationError::EmptySequence);
        }

        let resolved = node_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                self.registry
                    .lookup(id)
                    .map(|node| (id, node))
                    .ok_or_else(|| ValidationError::UnknownNode(id.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut steps = Vec::with_capacity(resolved.len());
        for (position, (node_id, node)) in resolved.into_iter().enumerate() {
            let params = node_params
                .and_then(|map| map.get(node_id))
                .cloned()
                .unwrap_or_default();

            node.validate_params(&params)
                .map_err(|source| ValidationError::InvalidParams {
                    node_id: node_id.to_string(),
                    position,
                    source,
                })?;

            tracing::debug!(
                node_id,
                position,
                params = params.len(),
                "Bound pipeline step"
            );

            steps.push(PipelineStep {
                node_id: node_id.to_string(),
                position,
                node,
                params,
            });
        }

        Ok(Pipeline { steps })
    }
}
