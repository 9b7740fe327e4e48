//! Shared vocabulary of the engine
//!
//! Vertex and workflow states, the messages vertices emit for their
//! dependents, the per-vertex execution result and the execution context that
//! is threaded through every computation.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a vertex in the workflow graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(pub String);

impl VertexId {
    /// Create a new VertexId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VertexId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VertexId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&VertexId> for VertexId {
    fn from(id: &VertexId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single vertex
///
/// `Pending` → `Executing` → `Completed` | `Failed`. Terminal states never
/// go back, so a vertex executes at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexState {
    /// Waiting for dependencies (or for the EXECUTE request)
    #[default]
    Pending,
    /// Computation in progress
    Executing,
    /// Computation produced a result
    Completed,
    /// Computation raised an error or reported failure
    Failed,
}

impl VertexState {
    pub fn is_pending(&self) -> bool {
        matches!(self, VertexState::Pending)
    }

    pub fn is_executing(&self) -> bool {
        matches!(self, VertexState::Executing)
    }

    /// Completed or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, VertexState::Completed | VertexState::Failed)
    }
}

/// Lifecycle of a whole workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Executing,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowState::Executing)
    }

    /// Lowercase name as reported to callers ("completed", "failed", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Executing => "executing",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data flowing from one vertex to a dependent
///
/// Delivering it both satisfies the receiver's dependency on the sender and
/// hands `content` to the receiver as input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub sender_vertex_id: VertexId,
    pub receiver_vertex_id: VertexId,
    #[serde(default)]
    pub content: Value,
}

impl WorkflowMessage {
    pub fn new(
        sender: impl Into<VertexId>,
        receiver: impl Into<VertexId>,
        content: impl Into<Value>,
    ) -> Self {
        Self {
            sender_vertex_id: sender.into(),
            receiver_vertex_id: receiver.into(),
            content: content.into(),
        }
    }
}

/// Outcome of one vertex computation
///
/// Produced once per vertex. Read-only after it is handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexExecutionResult {
    pub vertex_id: VertexId,
    pub status: VertexState,
    #[serde(default)]
    pub output_data: Value,
    #[serde(default)]
    pub messages: Vec<WorkflowMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VertexExecutionResult {
    /// Successful result carrying `output`
    pub fn completed(vertex_id: impl Into<VertexId>, output: impl Into<Value>) -> Self {
        Self {
            vertex_id: vertex_id.into(),
            status: VertexState::Completed,
            output_data: output.into(),
            messages: Vec::new(),
            error: None,
        }
    }

    /// Failed result carrying the error text
    pub fn failed(vertex_id: impl Into<VertexId>, error: impl Into<String>) -> Self {
        Self {
            vertex_id: vertex_id.into(),
            status: VertexState::Failed,
            output_data: Value::Null,
            messages: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Attach a message for `receiver`, sent from this result's vertex
    pub fn with_message(mut self, receiver: impl Into<VertexId>, content: impl Into<Value>) -> Self {
        let message = WorkflowMessage::new(self.vertex_id.clone(), receiver, content);
        self.messages.push(message);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == VertexState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == VertexState::Failed
    }
}

/// Execution-scoped metadata passed unchanged to every computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionContext {
    pub execution_id: String,
    pub workflow_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowExecutionContext {
    /// New context with a fresh execution id
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            project_id: None,
            user_id: None,
            started_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach an arbitrary metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Report returned by a workflow run
///
/// Always returned, even for failed runs: failure is expressed through
/// `status`, `failed_vertices` and `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub workflow_id: String,
    pub execution_id: String,
    pub status: WorkflowState,
    /// Outputs of completed leaf vertices (vertices without dependents)
    pub result: HashMap<VertexId, Value>,
    /// In completion order
    pub completed_vertices: Vec<VertexId>,
    pub failed_vertices: Vec<VertexId>,
    /// Vertices that never reported back (not started, or cancelled)
    #[serde(default)]
    pub unreached_vertices: Vec<VertexId>,
    #[serde(default)]
    pub errors: HashMap<VertexId, String>,
    #[serde(default)]
    pub protocol_errors: Vec<String>,
    #[serde(default)]
    pub duration: Duration,
}

impl WorkflowRunResult {
    pub fn is_completed(&self) -> bool {
        self.status == WorkflowState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == WorkflowState::Failed
    }

    /// Output of a completed leaf vertex
    pub fn output(&self, vertex_id: &str) -> Option<&Value> {
        self.result.get(&VertexId::new(vertex_id))
    }

    /// Final state of a vertex as observed by the coordinator
    pub fn vertex_state(&self, vertex_id: &VertexId) -> VertexState {
        if self.failed_vertices.contains(vertex_id) {
            VertexState::Failed
        } else if self.completed_vertices.contains(vertex_id) {
            VertexState::Completed
        } else {
            VertexState::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vertex_id_conversions() {
        let a: VertexId = "planner".into();
        let b: VertexId = String::from("planner").into();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "planner");
        assert_eq!(format!("{}", a), "planner");
    }

    #[test]
    fn test_vertex_id_serializes_as_plain_string() {
        let id = VertexId::new("fetch");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"fetch\"");
    }

    #[test]
    fn test_vertex_state_helpers() {
        assert!(VertexState::Pending.is_pending());
        assert!(VertexState::Executing.is_executing());
        assert!(!VertexState::Executing.is_terminal());
        assert!(VertexState::Completed.is_terminal());
        assert!(VertexState::Failed.is_terminal());
        assert_eq!(VertexState::default(), VertexState::Pending);
    }

    #[test]
    fn test_state_serialization_is_snake_case() {
        assert_eq!(serde_json::to_string(&VertexState::Executing).unwrap(), "\"executing\"");
        assert_eq!(serde_json::to_string(&WorkflowState::Failed).unwrap(), "\"failed\"");
        let state: WorkflowState = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(state, WorkflowState::Completed);
    }

    #[test]
    fn test_workflow_state_display() {
        assert_eq!(WorkflowState::Completed.to_string(), "completed");
        assert!(!WorkflowState::Executing.is_terminal());
        assert!(WorkflowState::Failed.is_terminal());
    }

    #[test]
    fn test_result_with_message_uses_own_vertex_as_sender() {
        let result = VertexExecutionResult::completed("a", json!({"n": 1}))
            .with_message("b", json!(1))
            .with_message("c", json!(2));

        assert!(result.is_completed());
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].sender_vertex_id, VertexId::new("a"));
        assert_eq!(result.messages[1].receiver_vertex_id, VertexId::new("c"));
    }

    #[test]
    fn test_failed_result() {
        let result = VertexExecutionResult::failed("a", "division by zero");
        assert!(result.is_failed());
        assert_eq!(result.error.as_deref(), Some("division by zero"));
        assert_eq!(result.output_data, Value::Null);
    }

    #[test]
    fn test_context_builder() {
        let ctx = WorkflowExecutionContext::new("wf")
            .with_execution_id("exec-1")
            .with_project_id("proj")
            .with_user_id("user")
            .with_metadata("priority", "high");

        assert_eq!(ctx.workflow_id, "wf");
        assert_eq!(ctx.execution_id, "exec-1");
        assert_eq!(ctx.project_id.as_deref(), Some("proj"));
        assert_eq!(ctx.user_id.as_deref(), Some("user"));
        assert_eq!(ctx.metadata.get("priority"), Some(&json!("high")));
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = WorkflowExecutionContext::new("wf");
        let b = WorkflowExecutionContext::new("wf");
        assert_ne!(a.execution_id, b.execution_id);
    }

    #[test]
    fn test_run_result_vertex_state() {
        let run = WorkflowRunResult {
            workflow_id: "wf".into(),
            execution_id: "e".into(),
            status: WorkflowState::Failed,
            result: HashMap::new(),
            completed_vertices: vec![VertexId::new("a")],
            failed_vertices: vec![VertexId::new("b")],
            unreached_vertices: vec![VertexId::new("c")],
            errors: HashMap::new(),
            protocol_errors: Vec::new(),
            duration: Duration::ZERO,
        };

        assert!(run.is_failed());
        assert_eq!(run.vertex_state(&VertexId::new("a")), VertexState::Completed);
        assert_eq!(run.vertex_state(&VertexId::new("b")), VertexState::Failed);
        assert_eq!(run.vertex_state(&VertexId::new("c")), VertexState::Pending);
    }
}
