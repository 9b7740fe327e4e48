//! actorflow: dependency-driven actor execution for workflow graphs
//!
//! Every vertex of a workflow runs as an isolated actor with its own mailbox.
//! A coordinator actor owns the workflow bookkeeping, forwards vertex output
//! along the dependency graph and decides when the run is over.
//!
//! - `VertexComputation`: the unit of work a vertex performs
//! - `VertexActor`: runs one computation at most once, when its dependencies are met
//! - `WorkflowCoordinatorActor`: routes results, detects completion and fails fast
//! - `WorkflowBuilder`: validates the graph and produces a runnable `BuiltWorkflow`
//!
//! # Example
//!
//! ```rust,ignore
//! use actorflow::{WorkflowBuilder, WorkflowExecutionContext};
//! use serde_json::json;
//!
//! let workflow = WorkflowBuilder::new()
//!     .with_id("greeting")
//!     .add_function_vertex("fetch", |_input, _ctx| async { Ok(json!("world")) })
//!     .add_function_vertex("greet", |input, _ctx| async move {
//!         Ok(json!(format!("hello {}", input.as_str().unwrap_or_default())))
//!     })
//!     .add_edge("fetch", "greet")
//!     .build()?;
//!
//! let ctx = WorkflowExecutionContext::new(workflow.id());
//! let run = workflow.execute(ctx, Default::default()).await;
//! assert!(run.is_completed());
//! ```

pub mod actor;
pub mod computation;
pub mod config;
pub mod error;
pub mod model;
pub mod workflow;

// Re-exports for convenience
pub use actor::{
    spawn_actor, Actor, ActorControl, ActorHandle, ActorId, ActorMessage, CoordinatorEvent,
    VertexActor, VertexCommand, WorkflowCoordinatorActor,
};
pub use computation::{BoxedComputation, FunctionComputation, VertexComputation};
pub use config::{EngineConfig, InputMerge};
pub use error::{BuildError, ComputationError, EngineError};
pub use model::{
    VertexExecutionResult, VertexId, VertexState, WorkflowExecutionContext, WorkflowMessage,
    WorkflowRunResult, WorkflowState,
};
pub use workflow::{
    BuiltWorkflow, EdgeDefinition, VertexDefinition, VertexSpec, WorkflowBuilder,
    WorkflowDefinition, WorkflowStats,
};
