//! Workflow construction
//!
//! `WorkflowBuilder` collects vertices and edges, validates them and produces
//! a `BuiltWorkflow`, which can be inspected, exported and executed any
//! number of times on the actor engine.

mod builder;
mod built;
mod definition;
pub mod visualization;

pub use builder::{VertexSpec, WorkflowBuilder};
pub use built::BuiltWorkflow;
pub use definition::{EdgeDefinition, VertexDefinition, WorkflowDefinition, WorkflowStats};
pub use visualization::VertexRole;
