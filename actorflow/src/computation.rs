//! Vertex computations
//!
//! A computation turns a vertex's input (plus any inbound messages) into a
//! `VertexExecutionResult`. What it does internally is opaque to the engine:
//! an agent call, a team task or a plain function all look the same here.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::ComputationError;
use crate::model::{VertexExecutionResult, VertexId, WorkflowExecutionContext, WorkflowMessage};

/// The unit of work behind a vertex
///
/// Returning `Err` (or panicking) never brings the engine down: the owning
/// vertex actor converts it into a FAILED result carrying the error text.
///
/// # Example
///
/// ```ignore
/// struct Doubler;
///
/// #[async_trait]
/// impl VertexComputation for Doubler {
///     async fn compute(
///         &self,
///         vertex_id: &VertexId,
///         input: Value,
///         _messages: &[WorkflowMessage],
///         _context: &WorkflowExecutionContext,
///     ) -> Result<VertexExecutionResult, ComputationError> {
///         let n = input.as_i64().ok_or_else(|| ComputationError::invalid_input("not a number"))?;
///         Ok(VertexExecutionResult::completed(vertex_id.clone(), n * 2).with_message("sink", n * 2))
///     }
/// }
/// ```
#[async_trait]
pub trait VertexComputation: Send + Sync {
    /// Execute the vertex
    ///
    /// `messages` is empty unless the engine runs with
    /// `InputMerge::ByDependency`, in which case it holds every inbound
    /// message in arrival order.
    async fn compute(
        &self,
        vertex_id: &VertexId,
        input: Value,
        messages: &[WorkflowMessage],
        context: &WorkflowExecutionContext,
    ) -> Result<VertexExecutionResult, ComputationError>;
}

/// Shared computation for dynamic dispatch
pub type BoxedComputation = Arc<dyn VertexComputation>;

type VertexFn =
    dyn Fn(Value, Arc<WorkflowExecutionContext>) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync;

/// Adapter running a plain async function as a vertex
///
/// The function's output becomes `output_data` and is sent as message content
/// to every output target.
#[derive(Clone)]
pub struct FunctionComputation {
    func: Arc<VertexFn>,
    targets: Vec<VertexId>,
}

impl FunctionComputation {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Value, Arc<WorkflowExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |input, ctx| Box::pin(func(input, ctx))),
            targets: Vec::new(),
        }
    }

    /// Set the vertices that receive this function's output
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = impl Into<VertexId>>) -> Self {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn targets(&self) -> &[VertexId] {
        &self.targets
    }
}

impl std::fmt::Debug for FunctionComputation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionComputation")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VertexComputation for FunctionComputation {
    async fn compute(
        &self,
        vertex_id: &VertexId,
        input: Value,
        _messages: &[WorkflowMessage],
        context: &WorkflowExecutionContext,
    ) -> Result<VertexExecutionResult, ComputationError> {
        let output = (self.func)(input, Arc::new(context.clone())).await?;

        let mut result = VertexExecutionResult::completed(vertex_id.clone(), output.clone());
        for target in &self.targets {
            result = result.with_message(target.clone(), output.clone());
        }
        Ok(result)
    }
}
