//! # Workflow Files
//!
//! Declarative workflows in YAML or JSON:
//!
//! ```yaml
//! id: nightly
//! name: Nightly import
//! vertices:
//!   - id: fetch
//!     type: constant
//!     value: { rows: 120 }
//!   - id: settle
//!     type: delay
//!     millis: 50
//!   - id: store
//!     type: passthrough
//! edges:
//!   - from: fetch
//!     to: settle
//!   - from: settle
//!     to: store
//!     metadata: { label: "after settle" }
//! ```

use std::path::Path;
use std::time::Duration;

use actorflow::{EngineConfig, FunctionComputation, VertexId, WorkflowBuilder};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// FILE FORMAT
// =============================================================================

/// What a vertex from a file does when it runs
///
/// # Rust Concept: Internally Tagged Enums
///
/// `#[serde(tag = "type")]` reads the variant name from a `type` field that
/// sits next to the variant's own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VertexKind {
    /// Output = input
    Passthrough,
    /// Output = `value`, regardless of input
    Constant { value: Value },
    /// Always fails with `message`
    Fail { message: String },
    /// Waits `millis`, then passes the input through
    Delay { millis: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexFile {
    pub id: VertexId,
    #[serde(flatten)]
    pub kind: VertexKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFile {
    pub from: VertexId,
    pub to: VertexId,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Top-level document of a workflow file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Overrides the environment's engine settings when present
    #[serde(default)]
    pub config: Option<EngineConfig>,
    pub vertices: Vec<VertexFile>,
    #[serde(default)]
    pub edges: Vec<EdgeFile>,
}

// =============================================================================
// LOADING
// =============================================================================

impl WorkflowFile {
    /// Read a workflow file; `.json` is parsed as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read workflow file {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON workflow in {}", path.display()))
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("invalid YAML workflow in {}", path.display()))
        }
    }

    /// Turn the file into a builder; `default_config` applies unless the file
    /// carries its own `config` section
    pub fn into_builder(self, default_config: EngineConfig) -> WorkflowBuilder {
        let mut builder = WorkflowBuilder::new()
            .with_id(self.id)
            .with_config(self.config.unwrap_or(default_config));

        if let Some(name) = self.name {
            builder = builder.with_name(name);
        }
        if let Some(description) = self.description {
            builder = builder.with_description(description);
        }
        for (key, value) in self.metadata {
            builder = builder.with_metadata(key, value);
        }

        for vertex in self.vertices {
            builder = builder.add_vertex_spec(vertex.id, computation_for(vertex.kind));
        }

        for edge in self.edges {
            builder = if edge.metadata.is_empty() {
                builder.add_edge(edge.from, edge.to)
            } else {
                builder.add_edge_with_metadata(edge.from, edge.to, edge.metadata)
            };
        }

        builder
    }
}

fn computation_for(kind: VertexKind) -> FunctionComputation {
    match kind {
        VertexKind::Passthrough => FunctionComputation::new(|input, _| async move { Ok(input) }),
        VertexKind::Constant { value } => FunctionComputation::new(move |_, _| {
            let value = value.clone();
            async move { Ok(value) }
        }),
        VertexKind::Fail { message } => FunctionComputation::new(move |_, _| {
            let message = message.clone();
            async move { Err(anyhow::anyhow!(message)) }
        }),
        VertexKind::Delay { millis } => FunctionComputation::new(move |input, _| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(input)
        }),
    }
}
