//! Vertex actor: runs one computation, at most once
//!
//! [`VertexActor`] is the record the coordinator keeps for a vertex: its
//! dependency bookkeeping plus the handle of the actor task. The task itself
//! owns the vertex state machine and publishes every transition on a watch
//! channel, so the state has exactly one writer.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::base::{
    mailbox, spawn_actor, Actor, ActorControl, ActorHandle, ActorMessage, Address, CorrelationId,
};
use super::message::{CoordinatorEvent, VertexCommand};
use crate::computation::BoxedComputation;
use crate::error::EngineError;
use crate::model::{VertexExecutionResult, VertexId, VertexState, WorkflowExecutionContext, WorkflowMessage};

/// Record of one vertex in a workflow run
pub struct VertexActor {
    actor_id: String,
    vertex_id: VertexId,
    computation: BoxedComputation,
    dependencies: HashSet<VertexId>,
    dependents: HashSet<VertexId>,
    pending_dependencies: HashSet<VertexId>,
    state_tx: Option<watch::Sender<VertexState>>,
    state_rx: watch::Receiver<VertexState>,
    coordinator: Option<Address<CoordinatorEvent>>,
    handle: Option<ActorHandle<VertexCommand>>,
    execute_request: Option<CorrelationId>,
    inbox: Vec<WorkflowMessage>,
    result: Option<VertexExecutionResult>,
}

impl VertexActor {
    pub fn new(
        vertex_id: impl Into<VertexId>,
        computation: BoxedComputation,
        dependencies: impl IntoIterator<Item = impl Into<VertexId>>,
        dependents: impl IntoIterator<Item = impl Into<VertexId>>,
    ) -> Self {
        let vertex_id = vertex_id.into();
        let dependencies: HashSet<VertexId> = dependencies.into_iter().map(Into::into).collect();
        let dependents = dependents.into_iter().map(Into::into).collect();
        let (state_tx, state_rx) = watch::channel(VertexState::Pending);

        Self {
            actor_id: format!("vertex_{}", vertex_id),
            pending_dependencies: dependencies.clone(),
            vertex_id,
            computation,
            dependencies,
            dependents,
            state_tx: Some(state_tx),
            state_rx,
            coordinator: None,
            handle: None,
            execute_request: None,
            inbox: Vec::new(),
            result: None,
        }
    }

    pub fn vertex_id(&self) -> &VertexId {
        &self.vertex_id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn dependencies(&self) -> &HashSet<VertexId> {
        &self.dependencies
    }

    pub fn dependents(&self) -> &HashSet<VertexId> {
        &self.dependents
    }

    pub fn pending_dependencies(&self) -> &HashSet<VertexId> {
        &self.pending_dependencies
    }

    /// Graph leaf: its output contributes to the workflow result
    pub fn is_leaf(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Current state as published by the vertex's own task
    pub fn state(&self) -> VertexState {
        *self.state_rx.borrow()
    }

    /// Result reported to the coordinator, if any
    pub fn result(&self) -> Option<&VertexExecutionResult> {
        self.result.as_ref()
    }

    /// Where results and errors are reported
    pub fn set_coordinator(&mut self, coordinator: Address<CoordinatorEvent>) {
        self.coordinator = Some(coordinator);
    }

    /// Start the message loop; calling it again is a no-op
    pub fn start(&mut self, mailbox_capacity: Option<usize>) {
        let Some(state_tx) = self.state_tx.take() else {
            return;
        };

        let (address, mailbox) = mailbox(self.actor_id.clone(), mailbox_capacity);
        let task = VertexTask {
            actor_id: self.actor_id.clone(),
            vertex_id: self.vertex_id.clone(),
            computation: Arc::clone(&self.computation),
            state: VertexState::Pending,
            state_tx,
            coordinator: self.coordinator.clone(),
        };
        self.handle = Some(spawn_actor(task, address, mailbox));
    }

    /// Stop the message loop (idempotent)
    pub async fn stop(&self) {
        if let Some(handle) = &self.handle {
            handle.stop().await;
        }
    }

    pub fn handle(&self) -> Option<&ActorHandle<VertexCommand>> {
        self.handle.as_ref()
    }

    /// Enqueue a command into this vertex's mailbox
    pub async fn send(&self, message: ActorMessage<VertexCommand>) -> Result<(), EngineError> {
        match &self.handle {
            Some(handle) => handle.send(message).await,
            None => Err(EngineError::MailboxClosed(self.actor_id.clone())),
        }
    }

    /// Mark `dependency_id` as satisfied
    ///
    /// Returns false when it was not pending (already satisfied, or not a
    /// dependency at all).
    pub fn dependency_satisfied(&mut self, dependency_id: &VertexId) -> bool {
        self.pending_dependencies.remove(dependency_id)
    }

    /// All dependencies satisfied and still pending
    ///
    /// A vertex whose EXECUTE is already queued is not ready again, even
    /// though its task has not switched to `Executing` yet.
    pub fn is_ready(&self) -> bool {
        self.pending_dependencies.is_empty()
            && self.state() == VertexState::Pending
            && self.execute_request.is_none()
    }

    pub(crate) fn execute_request(&self) -> Option<CorrelationId> {
        self.execute_request
    }

    pub(crate) fn mark_execute_requested(&mut self, correlation_id: CorrelationId) {
        self.execute_request = Some(correlation_id);
    }

    pub(crate) fn push_inbox(&mut self, message: WorkflowMessage) {
        self.inbox.push(message);
    }

    pub(crate) fn inbox(&self) -> &[WorkflowMessage] {
        &self.inbox
    }

    pub(crate) fn record_result(&mut self, result: VertexExecutionResult) {
        self.result = Some(result);
    }

    /// Reported back to the coordinator (either way)
    pub(crate) fn is_reported(&self) -> bool {
        self.result.is_some()
    }
}

impl std::fmt::Debug for VertexActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexActor")
            .field("vertex_id", &self.vertex_id)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("pending_dependencies", &self.pending_dependencies)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// The part of a vertex that runs on its own task
struct VertexTask {
    actor_id: String,
    vertex_id: VertexId,
    computation: BoxedComputation,
    state: VertexState,
    state_tx: watch::Sender<VertexState>,
    coordinator: Option<Address<CoordinatorEvent>>,
}

impl VertexTask {
    fn set_state(&mut self, state: VertexState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    async fn execute(
        &mut self,
        input: Value,
        messages: Vec<WorkflowMessage>,
        context: Arc<WorkflowExecutionContext>,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), EngineError> {
        if self.state != VertexState::Pending {
            debug!(vertex = %self.vertex_id, state = ?self.state, "ignoring duplicate execute request");
            return Ok(());
        }

        self.set_state(VertexState::Executing);
        debug!(vertex = %self.vertex_id, "executing");

        let computation = Arc::clone(&self.computation);
        let outcome = AssertUnwindSafe(computation.compute(&self.vertex_id, input, &messages, &context))
            .catch_unwind()
            .await;

        let report = match outcome {
            Ok(Ok(result)) => self.check_result(result),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(panic_message(panic.as_ref())),
        };

        let event = match report {
            Ok(result) => {
                self.set_state(VertexState::Completed);
                CoordinatorEvent::Result {
                    vertex_id: self.vertex_id.clone(),
                    result,
                }
            }
            Err(error) => {
                error!(vertex = %self.vertex_id, %error, "vertex execution failed");
                self.set_state(VertexState::Failed);
                CoordinatorEvent::Error {
                    vertex_id: self.vertex_id.clone(),
                    error,
                }
            }
        };

        if let Some(coordinator) = &self.coordinator {
            let message = ActorMessage::new(self.actor_id.clone(), coordinator.id(), event)
                .with_correlation(correlation_id);
            coordinator.send(message).await?;
        }
        Ok(())
    }

    /// A result must be terminal and belong to this vertex
    fn check_result(&self, mut result: VertexExecutionResult) -> Result<VertexExecutionResult, String> {
        if result.vertex_id != self.vertex_id {
            warn!(
                vertex = %self.vertex_id,
                reported = %result.vertex_id,
                "computation returned a result for another vertex"
            );
            result.vertex_id = self.vertex_id.clone();
        }

        match result.status {
            VertexState::Completed => Ok(result),
            VertexState::Failed => Err(result
                .error
                .unwrap_or_else(|| "vertex reported failure".to_string())),
            other => Err(format!(
                "computation returned non-terminal status {:?}",
                other
            )),
        }
    }
}

#[async_trait]
impl Actor for VertexTask {
    type Message = VertexCommand;

    fn id(&self) -> &str {
        &self.actor_id
    }

    async fn handle(&mut self, message: ActorMessage<VertexCommand>) -> Result<ActorControl, EngineError> {
        let correlation_id = message.correlation_id;
        match message.payload {
            VertexCommand::Execute {
                input,
                messages,
                context,
            } => {
                self.execute(input, messages, context, correlation_id).await?;
                Ok(ActorControl::Continue)
            }
            VertexCommand::Terminate => {
                debug!(vertex = %self.vertex_id, "terminate received");
                Ok(ActorControl::Stop)
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("computation panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("computation panicked: {}", s)
    } else {
        "computation panicked".to_string()
    }
}
