//! Core abstractions for the node chain engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the shared [`State`], the [`Node`] contract,
//! per-node parameters and the error taxonomy.

mod error;
pub mod events;
mod node;
mod params;
mod state;
mod value;

pub use error::{ChainError, ErrorKind, ExecutionError, NodeError, RegistryError, ValidationError};
pub use events::*;
pub use node::{Node, NodeContext, NodeMetadata, ParamDefinition};
pub use params::{ApiKeys, NodeParams, NodeParamsMap};
pub use state::State;
pub use value::Value;
