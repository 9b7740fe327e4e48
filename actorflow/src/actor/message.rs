//! Message protocol between vertex actors and the coordinator

use std::sync::Arc;

use serde_json::Value;

use crate::model::{VertexExecutionResult, VertexId, WorkflowExecutionContext, WorkflowMessage};

/// Kinds of messages exchanged by the engine's actors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorMessageType {
    Execute,
    Result,
    Error,
    Terminate,
}

impl ActorMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorMessageType::Execute => "execute",
            ActorMessageType::Result => "result",
            ActorMessageType::Error => "error",
            ActorMessageType::Terminate => "terminate",
        }
    }
}

/// Coordinator → vertex
#[derive(Debug, Clone)]
pub enum VertexCommand {
    /// Run the computation (ignored unless the vertex is still pending)
    Execute {
        input: Value,
        messages: Vec<WorkflowMessage>,
        context: Arc<WorkflowExecutionContext>,
    },
    /// Stop the vertex's message loop
    Terminate,
}

impl VertexCommand {
    pub fn kind(&self) -> ActorMessageType {
        match self {
            VertexCommand::Execute { .. } => ActorMessageType::Execute,
            VertexCommand::Terminate => ActorMessageType::Terminate,
        }
    }
}

/// Vertex → coordinator
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// The vertex completed; `result` is read-only from here on
    Result {
        vertex_id: VertexId,
        result: VertexExecutionResult,
    },
    /// The vertex failed; only the error summary crosses the boundary
    Error { vertex_id: VertexId, error: String },
}

impl CoordinatorEvent {
    pub fn kind(&self) -> ActorMessageType {
        match self {
            CoordinatorEvent::Result { .. } => ActorMessageType::Result,
            CoordinatorEvent::Error { .. } => ActorMessageType::Error,
        }
    }

    pub fn vertex_id(&self) -> &VertexId {
        match self {
            CoordinatorEvent::Result { vertex_id, .. } | CoordinatorEvent::Error { vertex_id, .. } => {
                vertex_id
            }
        }
    }
}
