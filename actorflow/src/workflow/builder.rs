//! Fluent builder for workflow graphs
//!
//! Vertices and edges are collected without checks; `validate()` reports every
//! problem at once and `build()` refuses to produce a workflow that has any.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::built::{BuiltWorkflow, VertexEntry};
use super::definition::EdgeDefinition;
use crate::computation::{BoxedComputation, FunctionComputation};
use crate::config::EngineConfig;
use crate::error::BuildError;
use crate::model::{VertexId, WorkflowExecutionContext};

/// What runs behind a vertex
#[derive(Clone)]
pub enum VertexSpec {
    /// Any computation; it decides itself which dependents it messages
    Custom(BoxedComputation),
    /// Plain function; its output is sent to every dependent
    Function(FunctionComputation),
}

impl VertexSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            VertexSpec::Custom(_) => "custom",
            VertexSpec::Function(_) => "function",
        }
    }
}

impl std::fmt::Debug for VertexSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

impl From<BoxedComputation> for VertexSpec {
    fn from(computation: BoxedComputation) -> Self {
        VertexSpec::Custom(computation)
    }
}

impl From<FunctionComputation> for VertexSpec {
    fn from(function: FunctionComputation) -> Self {
        VertexSpec::Function(function)
    }
}

/// Builder for a [`BuiltWorkflow`]
///
/// # Example
///
/// ```ignore
/// let workflow = WorkflowBuilder::new()
///     .with_id("etl")
///     .add_function_vertex("extract", |input, _| async move { Ok(input) })
///     .add_function_vertex("load", |input, _| async move { Ok(input) })
///     .add_edge("extract", "load")
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkflowBuilder {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    metadata: Map<String, Value>,
    config: EngineConfig,
    vertices: Vec<(VertexId, VertexSpec)>,
    edges: Vec<EdgeDefinition>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Linear chain: each step depends on the one before it
    pub fn sequential<I, S>(id: impl Into<String>, steps: impl IntoIterator<Item = (I, S)>) -> Self
    where
        I: Into<VertexId>,
        S: Into<VertexSpec>,
    {
        let mut builder = Self::new().with_id(id);
        let mut previous: Option<VertexId> = None;
        for (step_id, spec) in steps {
            let step_id = step_id.into();
            builder.vertices.push((step_id.clone(), spec.into()));
            if let Some(previous) = previous.take() {
                builder.edges.push(EdgeDefinition::new(previous, step_id.clone()));
            }
            previous = Some(step_id);
        }
        builder
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a vertex backed by an arbitrary computation
    pub fn add_vertex(mut self, id: impl Into<VertexId>, computation: BoxedComputation) -> Self {
        self.vertices.push((id.into(), VertexSpec::Custom(computation)));
        self
    }

    /// Add a vertex backed by an async function
    ///
    /// The function's output is forwarded to all dependents of the vertex.
    pub fn add_function_vertex<F, Fut>(mut self, id: impl Into<VertexId>, func: F) -> Self
    where
        F: Fn(Value, Arc<WorkflowExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.vertices
            .push((id.into(), VertexSpec::Function(FunctionComputation::new(func))));
        self
    }

    /// Add a vertex from a prepared spec
    pub fn add_vertex_spec(mut self, id: impl Into<VertexId>, spec: impl Into<VertexSpec>) -> Self {
        self.vertices.push((id.into(), spec.into()));
        self
    }

    /// `vertex` runs only after `depends_on` completed
    pub fn add_dependency(self, vertex: impl Into<VertexId>, depends_on: impl Into<VertexId>) -> Self {
        self.add_edge(depends_on, vertex)
    }

    /// Edge `from → to`: `to` depends on `from`
    pub fn add_edge(mut self, from: impl Into<VertexId>, to: impl Into<VertexId>) -> Self {
        self.edges.push(EdgeDefinition::new(from, to));
        self
    }

    /// Edge with free-form metadata (a `label` entry is shown in diagrams)
    pub fn add_edge_with_metadata(
        mut self,
        from: impl Into<VertexId>,
        to: impl Into<VertexId>,
        metadata: Map<String, Value>,
    ) -> Self {
        self.edges.push(EdgeDefinition::new(from, to).with_metadata(metadata));
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Every problem with the current definition; empty when it can be built
    pub fn validate(&self) -> Vec<BuildError> {
        let mut errors = Vec::new();

        if self.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            errors.push(BuildError::MissingId);
        }
        if self.vertices.is_empty() {
            errors.push(BuildError::NoVertices);
        }

        let mut known: HashSet<&VertexId> = HashSet::new();
        for (id, _) in &self.vertices {
            if !known.insert(id) {
                errors.push(BuildError::DuplicateVertex(id.clone()));
            }
        }

        let mut seen_edges: HashSet<(&VertexId, &VertexId)> = HashSet::new();
        let mut graph_edges: Vec<(&VertexId, &VertexId)> = Vec::new();
        for edge in &self.edges {
            let mut valid = true;
            if !known.contains(&edge.from) {
                errors.push(BuildError::UnknownSource(edge.from.clone()));
                valid = false;
            }
            if !known.contains(&edge.to) {
                errors.push(BuildError::UnknownTarget(edge.to.clone()));
                valid = false;
            }
            if edge.from == edge.to {
                errors.push(BuildError::SelfLoop(edge.from.clone()));
                valid = false;
            }
            if !seen_edges.insert((&edge.from, &edge.to)) {
                errors.push(BuildError::DuplicateEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
                valid = false;
            }
            if valid {
                graph_edges.push((&edge.from, &edge.to));
            }
        }

        let cyclic = vertices_on_cycles(&known, &graph_edges);
        if !cyclic.is_empty() {
            errors.push(BuildError::Cycle(cyclic));
        }

        errors
    }

    /// Validate and freeze the workflow
    pub fn build(self) -> Result<BuiltWorkflow, BuildError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(BuildError::Invalid(errors));
        }

        let mut entries: BTreeMap<VertexId, VertexEntry> = self
            .vertices
            .into_iter()
            .map(|(id, spec)| {
                let entry = VertexEntry {
                    spec,
                    dependencies: BTreeSet::new(),
                    dependents: BTreeSet::new(),
                };
                (id, entry)
            })
            .collect();

        for edge in &self.edges {
            if let Some(entry) = entries.get_mut(&edge.from) {
                entry.dependents.insert(edge.to.clone());
            }
            if let Some(entry) = entries.get_mut(&edge.to) {
                entry.dependencies.insert(edge.from.clone());
            }
        }

        // validate() guarantees the id is present
        let id = self.id.unwrap_or_default();
        Ok(BuiltWorkflow {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            description: self.description,
            metadata: self.metadata,
            config: self.config,
            vertices: entries,
            edges: self.edges,
        })
    }
}

/// Kahn's algorithm; returns the vertices left over (sorted), which are
/// exactly those on or downstream of a cycle
fn vertices_on_cycles(vertices: &HashSet<&VertexId>, edges: &[(&VertexId, &VertexId)]) -> Vec<VertexId> {
    let mut in_degree: HashMap<&VertexId, usize> = vertices.iter().map(|v| (*v, 0)).collect();
    let mut outgoing: HashMap<&VertexId, Vec<&VertexId>> = HashMap::new();
    for (from, to) in edges {
        outgoing.entry(*from).or_default().push(*to);
        if let Some(degree) = in_degree.get_mut(*to) {
            *degree += 1;
        }
    }

    let mut queue: Vec<&VertexId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(v, _)| *v)
        .collect();
    let mut visited = 0;

    while let Some(vertex) = queue.pop() {
        visited += 1;
        for next in outgoing.get(vertex).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(*next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push(*next);
                }
            }
        }
    }

    if visited == in_degree.len() {
        return Vec::new();
    }

    let mut remaining: Vec<VertexId> = in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(v, _)| v.clone())
        .collect();
    remaining.sort();
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> FunctionComputation {
        FunctionComputation::new(|input, _| async move { Ok(input) })
    }

    fn diamond() -> WorkflowBuilder {
        WorkflowBuilder::new()
            .with_id("diamond")
            .add_vertex_spec("a", noop())
            .add_vertex_spec("b", noop())
            .add_vertex_spec("c", noop())
            .add_vertex_spec("d", noop())
            .add_edge("a", "b")
            .add_edge("a", "c")
            .add_edge("b", "d")
            .add_edge("c", "d")
    }

    #[test]
    fn test_valid_workflow_has_no_errors() {
        assert!(diamond().validate().is_empty());
        let workflow = diamond().build().unwrap();
        assert_eq!(workflow.id(), "diamond");
        assert_eq!(workflow.name(), "diamond");
        assert_eq!(workflow.vertex_count(), 4);
        assert_eq!(workflow.edge_count(), 4);
    }

    #[test]
    fn test_missing_id_and_vertices() {
        let errors = WorkflowBuilder::new().validate();
        assert_eq!(errors, vec![BuildError::MissingId, BuildError::NoVertices]);

        let errors = WorkflowBuilder::new().with_id("  ").add_vertex_spec("a", noop()).validate();
        assert_eq!(errors, vec![BuildError::MissingId]);
    }

    #[test]
    fn test_duplicate_vertex() {
        let errors = WorkflowBuilder::new()
            .with_id("wf")
            .add_vertex_spec("v1", noop())
            .add_vertex_spec("v1", noop())
            .validate();
        assert_eq!(errors, vec![BuildError::DuplicateVertex(VertexId::new("v1"))]);
        assert_eq!(errors[0].to_string(), "vertex id 'v1' already exists");
    }

    #[test]
    fn test_unknown_endpoints() {
        let errors = WorkflowBuilder::new()
            .with_id("wf")
            .add_vertex_spec("v1", noop())
            .add_edge("v1", "v2")
            .add_edge("v0", "v1")
            .validate();
        assert_eq!(
            errors,
            vec![
                BuildError::UnknownTarget(VertexId::new("v2")),
                BuildError::UnknownSource(VertexId::new("v0")),
            ]
        );
    }

    #[test]
    fn test_self_loop_and_duplicate_edge() {
        let errors = WorkflowBuilder::new()
            .with_id("wf")
            .add_vertex_spec("a", noop())
            .add_vertex_spec("b", noop())
            .add_edge("a", "a")
            .add_edge("a", "b")
            .add_dependency("b", "a")
            .validate();
        assert_eq!(
            errors,
            vec![
                BuildError::SelfLoop(VertexId::new("a")),
                BuildError::DuplicateEdge {
                    from: VertexId::new("a"),
                    to: VertexId::new("b"),
                },
            ]
        );
    }

    #[test]
    fn test_cycle_detection() {
        let errors = WorkflowBuilder::new()
            .with_id("wf")
            .add_vertex_spec("a", noop())
            .add_vertex_spec("b", noop())
            .add_vertex_spec("c", noop())
            .add_vertex_spec("root", noop())
            .add_edge("root", "a")
            .add_edge("a", "b")
            .add_edge("b", "c")
            .add_edge("c", "a")
            .validate();
        assert_eq!(
            errors,
            vec![BuildError::Cycle(vec![
                VertexId::new("a"),
                VertexId::new("b"),
                VertexId::new("c"),
            ])]
        );
    }

    #[test]
    fn test_build_reports_all_errors() {
        let err = WorkflowBuilder::new().add_edge("x", "y").build().unwrap_err();
        let errors = err.errors();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&BuildError::MissingId));
        assert!(errors.contains(&BuildError::UnknownSource(VertexId::new("x"))));
    }

    #[test]
    fn test_sequential_template() {
        let workflow = WorkflowBuilder::sequential("pipeline", [("one", noop()), ("two", noop()), ("three", noop())])
            .with_name("Three steps")
            .build()
            .unwrap();

        assert_eq!(workflow.name(), "Three steps");
        assert_eq!(workflow.edge_count(), 2);
        assert_eq!(
            workflow.execution_order(),
            vec![vec![VertexId::new("one")], vec![VertexId::new("two")], vec![VertexId::new("three")]]
        );
    }

    #[test]
    fn test_metadata_and_description_carry_over() {
        let mut edge_meta = Map::new();
        edge_meta.insert("label".into(), json!("raw"));
        let workflow = WorkflowBuilder::new()
            .with_id("wf")
            .with_description("loads data")
            .with_metadata("owner", "data-team")
            .add_vertex_spec("a", noop())
            .add_vertex_spec("b", noop())
            .add_edge_with_metadata("a", "b", edge_meta)
            .build()
            .unwrap();

        let definition = workflow.to_definition();
        assert_eq!(definition.description.as_deref(), Some("loads data"));
        assert_eq!(definition.metadata["owner"], json!("data-team"));
        assert_eq!(definition.edges[0].metadata["label"], json!("raw"));
    }

    #[test]
    fn test_builder_counts() {
        let builder = diamond();
        assert_eq!(builder.vertex_count(), 4);
        assert_eq!(builder.edge_count(), 4);
    }
}
