//! Pipeline execution runtime
//!
//! This crate provides the node registry, the pipeline builder that
//! validates and binds a requested node sequence, the sequential executor,
//! and the [`ChainRuntime`] facade tying them together.

mod executor;
mod pipeline;
mod registry;
mod runtime;

pub use executor::{ExecutionResult, PipelineExecutor, SoftFailurePolicy};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineStep};
pub use registry::NodeRegistry;
pub use runtime::{ChainRuntime, RuntimeConfig, WorkflowRequest};
