//! Serializable description of a built workflow

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::VertexId;

/// Edge between two vertices; `to` depends on `from`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: VertexId,
    pub to: VertexId,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl EdgeDefinition {
    pub fn new(from: impl Into<VertexId>, to: impl Into<VertexId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One vertex with its resolved neighbours (both lists sorted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexDefinition {
    pub id: VertexId,
    /// `function` for plain-function vertices, `custom` otherwise
    pub kind: String,
    pub dependencies: Vec<VertexId>,
    pub dependents: Vec<VertexId>,
}

/// Workflow as plain data, for export and inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub vertices: Vec<VertexDefinition>,
    pub edges: Vec<EdgeDefinition>,
}

/// Shape of a workflow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub vertex_count: usize,
    pub edge_count: usize,
    /// Vertices without dependencies
    pub root_count: usize,
    /// Vertices without dependents
    pub leaf_count: usize,
    /// Number of topological levels
    pub depth: usize,
    /// Largest number of vertices that can run at the same time
    pub max_parallelism: usize,
    pub max_fan_out: usize,
    pub max_fan_in: usize,
}
