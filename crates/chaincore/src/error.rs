use thiserror::Error;

/// Top-level error returned by the invocation facade
#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Which side of the call a [`ChainError`] blames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was malformed; nothing ran.
    BadRequest,
    /// A node failed while the pipeline was running.
    Internal,
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Validation(_) => ErrorKind::BadRequest,
            ChainError::Execution(_) => ErrorKind::Internal,
        }
    }

    pub fn is_bad_request(&self) -> bool {
        self.kind() == ErrorKind::BadRequest
    }
}

/// Signaled failure raised by a node
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },
}

impl NodeError {
    pub fn invalid_param(param: impl Into<String>, reason: impl Into<String>) -> Self {
        NodeError::InvalidParam {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// The message without the variant prefix, for recording in `State::error`
    pub fn detail(&self) -> String {
        match self {
            NodeError::ExecutionFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Request-shape errors, raised before any node runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Node sequence is empty")]
    EmptySequence,

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid parameters for node '{node_id}' at position {position}: {source}")]
    InvalidParams {
        node_id: String,
        position: usize,
        #[source]
        source: NodeError,
    },
}

/// A node failure that stopped the pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Node '{node_id}' at position {position} failed: {source}")]
    NodeFailed {
        node_id: String,
        position: usize,
        #[source]
        source: NodeError,
    },

    #[error("Node '{node_id}' at position {position} reported an error: {message}")]
    SoftFailure {
        node_id: String,
        position: usize,
        message: String,
    },
}

impl ExecutionError {
    pub fn node_id(&self) -> &str {
        match self {
            ExecutionError::NodeFailed { node_id, .. }
            | ExecutionError::SoftFailure { node_id, .. } => node_id,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            ExecutionError::NodeFailed { position, .. }
            | ExecutionError::SoftFailure { position, .. } => *position,
        }
    }
}

/// Registry misconfiguration detected at startup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Node '{0}' is registered more than once")]
    DuplicateNode(String),
}
