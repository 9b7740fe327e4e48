//! Workflow coordinator actor
//!
//! Owns every vertex record of a run. Reacts to RESULT and ERROR reports in
//! mailbox order: forwards output along the dependency graph, starts vertices
//! as they become ready, fails fast on the first error and collects the
//! outputs of leaf vertices once everything has finished.
//!
//! All bookkeeping (completed / failed sets, workflow state) is mutated only
//! inside the coordinator's own message handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::base::{
    mailbox, spawn_actor, Actor, ActorControl, ActorMessage, Address, CorrelationId, Mailbox,
};
use super::message::{CoordinatorEvent, VertexCommand};
use super::vertex::VertexActor;
use crate::config::{EngineConfig, InputMerge};
use crate::error::EngineError;
use crate::model::{
    VertexExecutionResult, VertexId, WorkflowExecutionContext, WorkflowMessage, WorkflowRunResult,
    WorkflowState,
};

/// Coordinator of a single workflow run
pub struct WorkflowCoordinatorActor {
    actor_id: String,
    workflow_id: String,
    config: EngineConfig,
    vertices: HashMap<VertexId, VertexActor>,
    completed_vertices: Vec<VertexId>,
    failed_vertices: Vec<VertexId>,
    workflow_state: WorkflowState,
    final_result: Option<HashMap<VertexId, Value>>,
    execution_context: Option<Arc<WorkflowExecutionContext>>,
    errors: HashMap<VertexId, String>,
    protocol_errors: Vec<String>,
    address: Address<CoordinatorEvent>,
    mailbox: Option<Mailbox<CoordinatorEvent>>,
    completion: Option<oneshot::Sender<WorkflowRunResult>>,
    started_at: Option<Instant>,
}

impl WorkflowCoordinatorActor {
    /// Take ownership of the vertex set and wire every vertex back to this
    /// coordinator
    ///
    /// Vertex ids are expected to be unique and acyclic; that is validated by
    /// `WorkflowBuilder`, not here.
    pub fn new(
        workflow_id: impl Into<String>,
        vertices: impl IntoIterator<Item = VertexActor>,
        config: EngineConfig,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let actor_id = format!("coordinator_{}", workflow_id);
        let (address, mailbox) = mailbox(actor_id.clone(), config.mailbox_capacity);

        let vertices = vertices
            .into_iter()
            .map(|mut vertex| {
                vertex.set_coordinator(address.clone());
                (vertex.vertex_id().clone(), vertex)
            })
            .collect();

        Self {
            actor_id,
            workflow_id,
            config,
            vertices,
            completed_vertices: Vec::new(),
            failed_vertices: Vec::new(),
            workflow_state: WorkflowState::Executing,
            final_result: None,
            execution_context: None,
            errors: HashMap::new(),
            protocol_errors: Vec::new(),
            address,
            mailbox: Some(mailbox),
            completion: None,
            started_at: None,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn workflow_state(&self) -> WorkflowState {
        self.workflow_state
    }

    pub fn completed_vertices(&self) -> &[VertexId] {
        &self.completed_vertices
    }

    pub fn failed_vertices(&self) -> &[VertexId] {
        &self.failed_vertices
    }

    pub fn vertex(&self, vertex_id: &VertexId) -> Option<&VertexActor> {
        self.vertices.get(vertex_id)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Run the workflow to a terminal state
    ///
    /// `input_data` holds the input of each root vertex (vertices without
    /// dependencies), keyed by vertex id; missing entries default to `{}`.
    /// Never fails: a failed run is reported through the returned status.
    pub async fn execute_workflow(
        mut self,
        context: WorkflowExecutionContext,
        mut input_data: HashMap<VertexId, Value>,
    ) -> WorkflowRunResult {
        let execution_id = context.execution_id.clone();
        let workflow_id = self.workflow_id.clone();
        let started_at = Instant::now();
        let (completion_tx, completion_rx) = oneshot::channel();

        self.execution_context = Some(Arc::new(context));
        self.completion = Some(completion_tx);
        self.started_at = Some(started_at);

        info!(workflow = %self.workflow_id, execution = %execution_id, vertices = self.vertices.len(), "starting workflow");

        for vertex in self.vertices.values_mut() {
            vertex.start(self.config.mailbox_capacity);
        }
        let vertex_handles: Vec<_> = self
            .vertices
            .values()
            .filter_map(|vertex| vertex.handle().cloned())
            .collect();

        let mut roots: Vec<VertexId> = self
            .vertices
            .values()
            .filter(|vertex| vertex.is_ready())
            .map(|vertex| vertex.vertex_id().clone())
            .collect();
        roots.sort();

        for vertex_id in roots {
            let input = input_data.remove(&vertex_id).unwrap_or_else(|| json!({}));
            self.dispatch(&vertex_id, input, Vec::new()).await;
        }
        for unused in input_data.keys() {
            debug!(workflow = %self.workflow_id, vertex = %unused, "input supplied for a non-root vertex is ignored");
        }

        // Covers empty workflows and graphs where nothing could start
        self.check_workflow_completion().await;

        let mailbox = self.mailbox.take();
        let address = self.address.clone();
        let coordinator = mailbox.map(|mailbox| spawn_actor(self, address, mailbox));

        let report = match completion_rx.await {
            Ok(report) => report,
            Err(_) => {
                error!(workflow = %workflow_id, "coordinator stopped before the workflow finished");
                WorkflowRunResult {
                    workflow_id,
                    execution_id,
                    status: WorkflowState::Failed,
                    result: HashMap::new(),
                    completed_vertices: Vec::new(),
                    failed_vertices: Vec::new(),
                    unreached_vertices: Vec::new(),
                    errors: HashMap::new(),
                    protocol_errors: vec!["coordinator stopped before the workflow finished".into()],
                    duration: started_at.elapsed(),
                }
            }
        };

        join_all(vertex_handles.iter().map(|handle| handle.stop())).await;
        if let Some(coordinator) = coordinator {
            coordinator.stop().await;
        }

        info!(
            workflow = %report.workflow_id,
            status = %report.status,
            completed = report.completed_vertices.len(),
            failed = report.failed_vertices.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "workflow finished"
        );
        report
    }

    /// Send EXECUTE to a vertex and remember the correlation id
    async fn dispatch(&mut self, vertex_id: &VertexId, input: Value, messages: Vec<WorkflowMessage>) {
        let Some(context) = self.execution_context.clone() else {
            self.protocol_error(EngineError::MissingContext(vertex_id.clone()));
            return;
        };
        let Some(vertex) = self.vertices.get_mut(vertex_id) else {
            self.protocol_error(EngineError::UnknownVertex(vertex_id.clone()));
            return;
        };

        let correlation_id = CorrelationId::new_v4();
        vertex.mark_execute_requested(correlation_id);
        let message = ActorMessage::new(
            self.actor_id.clone(),
            vertex.actor_id(),
            VertexCommand::Execute {
                input,
                messages,
                context,
            },
        )
        .with_correlation(Some(correlation_id));

        debug!(workflow = %self.workflow_id, vertex = %vertex_id, "dispatching vertex");
        if let Err(e) = vertex.send(message).await {
            // The vertex can no longer run; that is a failure of the workflow
            self.handle_vertex_error(vertex_id.clone(), e.to_string()).await;
        }
    }

    /// Check a report against the request it answers
    fn accept_report(&mut self, vertex_id: &VertexId, correlation_id: Option<CorrelationId>) -> bool {
        if self.workflow_state.is_terminal() {
            debug!(workflow = %self.workflow_id, vertex = %vertex_id, "ignoring report after workflow finished");
            return false;
        }

        let Some(vertex) = self.vertices.get(vertex_id) else {
            self.protocol_error(EngineError::UnknownVertex(vertex_id.clone()));
            return false;
        };

        if vertex.is_reported() {
            self.protocol_error(EngineError::protocol(format!(
                "duplicate report from vertex {}",
                vertex_id
            )));
            return false;
        }

        match (vertex.execute_request(), correlation_id) {
            (Some(expected), Some(actual)) if expected == actual => true,
            (expected, actual) => {
                self.protocol_error(EngineError::protocol(format!(
                    "report from vertex {} has correlation {:?}, expected {:?}",
                    vertex_id, actual, expected
                )));
                false
            }
        }
    }

    async fn handle_vertex_result(
        &mut self,
        vertex_id: VertexId,
        result: VertexExecutionResult,
        correlation_id: Option<CorrelationId>,
    ) {
        if !self.accept_report(&vertex_id, correlation_id) {
            return;
        }

        if let Some(vertex) = self.vertices.get_mut(&vertex_id) {
            vertex.record_result(result.clone());
        }
        self.completed_vertices.push(vertex_id.clone());
        info!(workflow = %self.workflow_id, vertex = %vertex_id, "vertex completed");

        self.propagate_messages(&vertex_id, result.messages).await;
        self.check_workflow_completion().await;
    }

    async fn handle_vertex_error(&mut self, vertex_id: VertexId, error: String) {
        error!(workflow = %self.workflow_id, vertex = %vertex_id, %error, "vertex failed");

        if let Some(vertex) = self.vertices.get_mut(&vertex_id) {
            vertex.record_result(VertexExecutionResult::failed(vertex_id.clone(), error.clone()));
        }
        self.failed_vertices.push(vertex_id.clone());
        self.errors.insert(vertex_id, error);

        // Fail fast: nothing else may continue, nothing is retried
        self.workflow_state = WorkflowState::Failed;
        self.terminate_all_vertices().await;
        self.finish();
    }

    /// Deliver each message to its receiver and start receivers that became
    /// ready
    async fn propagate_messages(&mut self, sender: &VertexId, messages: Vec<WorkflowMessage>) {
        for message in messages {
            // A failed dispatch below may already have ended the run
            if self.workflow_state.is_terminal() {
                break;
            }
            if message.sender_vertex_id != *sender {
                debug!(
                    vertex = %sender,
                    claimed = %message.sender_vertex_id,
                    "message sender rewritten to the reporting vertex"
                );
            }

            let receiver_id = message.receiver_vertex_id.clone();
            let Some(receiver) = self.vertices.get_mut(&receiver_id) else {
                self.protocol_error(EngineError::UnknownVertex(receiver_id));
                continue;
            };

            if !receiver.dependencies().contains(sender) {
                let err = EngineError::protocol(format!(
                    "vertex {} does not depend on {}; message dropped",
                    receiver_id, sender
                ));
                self.protocol_error(err);
                continue;
            }

            receiver.dependency_satisfied(sender);
            receiver.push_inbox(WorkflowMessage {
                sender_vertex_id: sender.clone(),
                ..message
            });

            if receiver.is_ready() {
                let (input, messages) = match self.config.input_merge {
                    InputMerge::LastMessage => {
                        let content = receiver
                            .inbox()
                            .last()
                            .map(|m| m.content.clone())
                            .unwrap_or(Value::Null);
                        (non_null(content), Vec::new())
                    }
                    InputMerge::ByDependency => {
                        let inbox = receiver.inbox().to_vec();
                        let merged: Map<String, Value> = inbox
                            .iter()
                            .map(|m| (m.sender_vertex_id.to_string(), m.content.clone()))
                            .collect();
                        (Value::Object(merged), inbox)
                    }
                };
                self.dispatch(&receiver_id, input, messages).await;
            }
        }
    }

    /// Decide whether the run is over
    async fn check_workflow_completion(&mut self) {
        if self.workflow_state.is_terminal() {
            return;
        }

        let total = self.vertices.len();
        let finished = self.completed_vertices.len() + self.failed_vertices.len();

        if finished >= total {
            if self.failed_vertices.is_empty() {
                self.workflow_state = WorkflowState::Completed;
                self.collect_final_results();
            } else {
                self.workflow_state = WorkflowState::Failed;
            }
            self.terminate_all_vertices().await;
            self.finish();
            return;
        }

        let in_flight = self
            .vertices
            .values()
            .any(|vertex| vertex.execute_request().is_some() && !vertex.is_reported());
        if !in_flight {
            let mut waiting: Vec<String> = self
                .vertices
                .values()
                .filter(|vertex| vertex.execute_request().is_none())
                .map(|vertex| vertex.vertex_id().to_string())
                .collect();
            waiting.sort();
            let err = EngineError::protocol(format!(
                "workflow stalled: no vertex is executing and [{}] can never become ready",
                waiting.join(", ")
            ));
            self.protocol_error(err);
            self.workflow_state = WorkflowState::Failed;
            self.terminate_all_vertices().await;
            self.finish();
        }
    }

    /// Outputs of completed leaf vertices
    fn collect_final_results(&mut self) {
        let outputs = self
            .vertices
            .values()
            .filter(|vertex| vertex.is_leaf())
            .filter_map(|vertex| {
                vertex
                    .result()
                    .filter(|result| result.is_completed())
                    .map(|result| (vertex.vertex_id().clone(), result.output_data.clone()))
            })
            .collect();
        self.final_result = Some(outputs);
    }

    async fn terminate_all_vertices(&self) {
        let sends = self.vertices.values().map(|vertex| {
            let message = ActorMessage::new(self.actor_id.clone(), vertex.actor_id(), VertexCommand::Terminate);
            async move {
                // Already stopped is fine
                if let Err(e) = vertex.send(message).await {
                    debug!(vertex = %vertex.vertex_id(), error = %e, "terminate not delivered");
                }
            }
        });
        join_all(sends).await;
    }

    fn protocol_error(&mut self, err: EngineError) {
        warn!(workflow = %self.workflow_id, error = %err, "protocol error");
        self.protocol_errors.push(err.to_string());
    }

    /// Resolve the completion signal (only the first call has an effect)
    fn finish(&mut self) {
        let Some(completion) = self.completion.take() else {
            return;
        };

        let mut unreached: Vec<VertexId> = self
            .vertices
            .values()
            .filter(|vertex| !vertex.is_reported())
            .map(|vertex| vertex.vertex_id().clone())
            .collect();
        unreached.sort();

        let report = WorkflowRunResult {
            workflow_id: self.workflow_id.clone(),
            execution_id: self
                .execution_context
                .as_ref()
                .map(|ctx| ctx.execution_id.clone())
                .unwrap_or_default(),
            status: self.workflow_state,
            result: self.final_result.clone().unwrap_or_default(),
            completed_vertices: self.completed_vertices.clone(),
            failed_vertices: self.failed_vertices.clone(),
            unreached_vertices: unreached,
            errors: self.errors.clone(),
            protocol_errors: self.protocol_errors.clone(),
            duration: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        };

        if completion.send(report).is_err() {
            debug!(workflow = %self.workflow_id, "completion receiver dropped");
        }
    }
}

fn non_null(value: Value) -> Value {
    if value.is_null() {
        json!({})
    } else {
        value
    }
}

#[async_trait]
impl Actor for WorkflowCoordinatorActor {
    type Message = CoordinatorEvent;

    fn id(&self) -> &str {
        &self.actor_id
    }

    async fn handle(&mut self, message: ActorMessage<CoordinatorEvent>) -> Result<ActorControl, EngineError> {
        let correlation_id = message.correlation_id;
        match message.payload {
            CoordinatorEvent::Result { vertex_id, result } => {
                self.handle_vertex_result(vertex_id, result, correlation_id).await;
            }
            CoordinatorEvent::Error { vertex_id, error } => {
                if self.accept_report(&vertex_id, correlation_id) {
                    self.handle_vertex_error(vertex_id, error).await;
                }
            }
        }
        Ok(ActorControl::Continue)
    }
}
