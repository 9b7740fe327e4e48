//! Error types for the actor engine
//!
//! Computation failures never cross an actor boundary as errors: the vertex
//! actor turns them into a FAILED result and only the message text reaches the
//! coordinator. The types here cover what callers can observe directly.

use thiserror::Error;

use crate::model::VertexId;

/// Errors raised by a `VertexComputation`
#[derive(Debug, Error)]
pub enum ComputationError {
    /// The computation could not produce a result
    #[error("computation failed: {0}")]
    Failed(String),

    /// The computation rejected its input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Any other error surfaced by user code
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ComputationError {
    /// Create a generic failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Create an input validation failure
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Errors from the actor runtime itself
#[derive(Debug, Error)]
pub enum EngineError {
    /// The target actor's mailbox is closed (actor stopped)
    #[error("mailbox closed for actor {0}")]
    MailboxClosed(String),

    /// A message arrived that the receiving actor does not expect
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A message referenced a vertex that is not part of the workflow
    #[error("unknown vertex: {0}")]
    UnknownVertex(VertexId),

    /// An EXECUTE arrived without an execution context
    #[error("execution context missing for vertex {0}")]
    MissingContext(VertexId),
}

impl EngineError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Check if this error only means the receiver has already shut down
    pub fn is_closed(&self) -> bool {
        matches!(self, EngineError::MailboxClosed(_))
    }
}

/// Problems found while validating a workflow definition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("workflow id is required")]
    MissingId,

    #[error("workflow must have at least one vertex")]
    NoVertices,

    #[error("vertex id '{0}' already exists")]
    DuplicateVertex(VertexId),

    #[error("edge from '{from}' to '{to}' already exists")]
    DuplicateEdge { from: VertexId, to: VertexId },

    #[error("source vertex '{0}' does not exist")]
    UnknownSource(VertexId),

    #[error("target vertex '{0}' does not exist")]
    UnknownTarget(VertexId),

    #[error("vertex '{0}' cannot depend on itself")]
    SelfLoop(VertexId),

    #[error("workflow contains a cycle through: {}", format_ids(.0))]
    Cycle(Vec<VertexId>),

    #[error("workflow validation failed: {}", format_errors(.0))]
    Invalid(Vec<BuildError>),
}

impl BuildError {
    /// Flatten into the individual validation problems
    pub fn errors(&self) -> Vec<BuildError> {
        match self {
            BuildError::Invalid(errors) => errors.clone(),
            other => vec![other.clone()],
        }
    }
}

fn format_ids(ids: &[VertexId]) -> String {
    ids.iter()
        .map(VertexId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_errors(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
