use chaincore::{Node, NodeMetadata, RegistryError};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available node implementations
///
/// Populated once at startup; share it behind an `Arc` afterwards, which
/// leaves no way to register further nodes.
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Build a registry from a fixed list of nodes, rejecting duplicates
    pub fn from_nodes(
        nodes: impl IntoIterator<Item = Arc<dyn Node>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for node in nodes {
            registry.register(node)?;
        }
        Ok(registry)
    }

    /// Register a node under its own `node_type`
    pub fn register(&mut self, node: Arc<dyn Node>) -> Result<(), RegistryError> {
        let node_type = node.node_type().to_string();
        if self.nodes.contains_key(&node_type) {
            return Err(RegistryError::DuplicateNode(node_type));
        }
        tracing::info!("Registering node type: {}", node_type);
        self.nodes.insert(node_type, node);
        Ok(())
    }

    pub fn lookup(&self, node_id: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(node_id).cloned()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Registered identifiers, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.nodes.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_id: &str) -> Option<NodeMetadata> {
        self.nodes.get(node_id).map(|n| n.metadata())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
