//! Validated, executable workflow

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::builder::VertexSpec;
use super::definition::{EdgeDefinition, VertexDefinition, WorkflowDefinition, WorkflowStats};
use super::visualization::{
    render_edge, render_node, render_node_with_state, NodeIds, VertexRole, STYLE_DEFS,
};
use crate::actor::{VertexActor, WorkflowCoordinatorActor};
use crate::computation::BoxedComputation;
use crate::config::EngineConfig;
use crate::model::{VertexId, WorkflowExecutionContext, WorkflowRunResult};

#[derive(Debug, Clone)]
pub(crate) struct VertexEntry {
    pub(crate) spec: VertexSpec,
    pub(crate) dependencies: BTreeSet<VertexId>,
    pub(crate) dependents: BTreeSet<VertexId>,
}

impl VertexEntry {
    fn role(&self) -> VertexRole {
        if self.dependencies.is_empty() {
            VertexRole::Root
        } else if self.dependents.is_empty() {
            VertexRole::Leaf
        } else {
            VertexRole::Inner
        }
    }
}

/// A workflow that passed validation
///
/// Immutable and reusable: every call to [`execute`](Self::execute) spawns a
/// fresh set of vertex actors and a fresh coordinator.
#[derive(Debug, Clone)]
pub struct BuiltWorkflow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) metadata: Map<String, Value>,
    pub(crate) config: EngineConfig,
    pub(crate) vertices: BTreeMap<VertexId, VertexEntry>,
    pub(crate) edges: Vec<EdgeDefinition>,
}

impl BuiltWorkflow {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertex ids in sorted order
    pub fn vertex_ids(&self) -> impl Iterator<Item = &VertexId> {
        self.vertices.keys()
    }

    /// Direct dependencies of a vertex (empty for unknown ids)
    pub fn dependencies(&self, vertex_id: &VertexId) -> Vec<VertexId> {
        self.vertices
            .get(vertex_id)
            .map(|entry| entry.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of a vertex (empty for unknown ids)
    pub fn dependents(&self, vertex_id: &VertexId) -> Vec<VertexId> {
        self.vertices
            .get(vertex_id)
            .map(|entry| entry.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Topological levels
    ///
    /// Level 0 holds the roots; every vertex sits one level below its deepest
    /// dependency. Vertices on the same level can run concurrently.
    pub fn execution_order(&self) -> Vec<Vec<VertexId>> {
        let mut remaining: HashMap<&VertexId, usize> = self
            .vertices
            .iter()
            .map(|(id, entry)| (id, entry.dependencies.len()))
            .collect();

        let mut level: Vec<&VertexId> = self
            .vertices
            .iter()
            .filter(|(_, entry)| entry.dependencies.is_empty())
            .map(|(id, _)| id)
            .collect();

        let mut levels = Vec::new();
        while !level.is_empty() {
            let mut next = Vec::new();
            for id in &level {
                for dependent in &self.vertices[*id].dependents {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            next.sort();
            levels.push(level.into_iter().cloned().collect());
            level = next;
        }
        levels
    }

    pub fn stats(&self) -> WorkflowStats {
        let order = self.execution_order();
        WorkflowStats {
            vertex_count: self.vertex_count(),
            edge_count: self.edge_count(),
            root_count: self.vertices.values().filter(|e| e.dependencies.is_empty()).count(),
            leaf_count: self.vertices.values().filter(|e| e.dependents.is_empty()).count(),
            depth: order.len(),
            max_parallelism: order.iter().map(Vec::len).max().unwrap_or(0),
            max_fan_out: self.vertices.values().map(|e| e.dependents.len()).max().unwrap_or(0),
            max_fan_in: self.vertices.values().map(|e| e.dependencies.len()).max().unwrap_or(0),
        }
    }

    /// Plain-data description (serializable)
    pub fn to_definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            metadata: self.metadata.clone(),
            vertices: self
                .vertices
                .iter()
                .map(|(id, entry)| VertexDefinition {
                    id: id.clone(),
                    kind: entry.spec.kind().to_string(),
                    dependencies: entry.dependencies.iter().cloned().collect(),
                    dependents: entry.dependents.iter().cloned().collect(),
                })
                .collect(),
            edges: self.edges.clone(),
        }
    }

    /// Mermaid flowchart of the graph
    pub fn to_mermaid(&self) -> String {
        self.render_mermaid(None)
    }

    /// Mermaid flowchart coloured by the vertex states of a finished run
    pub fn to_mermaid_with_run(&self, run: &WorkflowRunResult) -> String {
        self.render_mermaid(Some(run))
    }

    fn render_mermaid(&self, run: Option<&WorkflowRunResult>) -> String {
        let nodes = NodeIds::new(self.vertices.keys());
        let mut lines = vec!["graph TD".to_string()];

        for (id, entry) in &self.vertices {
            let node_id = nodes.get(id);
            let line = match run {
                Some(run) => render_node_with_state(id, &node_id, entry.role(), run.vertex_state(id)),
                None => render_node(id, &node_id, entry.role()),
            };
            lines.push(line);
        }

        for edge in &self.edges {
            let label = edge.metadata.get("label").and_then(Value::as_str);
            lines.push(render_edge(&nodes.get(&edge.from), &nodes.get(&edge.to), label));
        }

        let mut diagram = lines.join("\n");
        if run.is_some() {
            diagram.push_str(STYLE_DEFS);
        }
        diagram
    }

    fn instantiate(&self) -> Vec<VertexActor> {
        self.vertices
            .iter()
            .map(|(id, entry)| {
                let computation: BoxedComputation = match &entry.spec {
                    VertexSpec::Custom(computation) => Arc::clone(computation),
                    VertexSpec::Function(function) => {
                        Arc::new(function.clone().with_targets(entry.dependents.iter().cloned()))
                    }
                };
                VertexActor::new(
                    id.clone(),
                    computation,
                    entry.dependencies.iter().cloned(),
                    entry.dependents.iter().cloned(),
                )
            })
            .collect()
    }

    /// Run the workflow once
    ///
    /// `input` maps root vertex ids to their input; roots without an entry
    /// receive `{}`.
    pub async fn execute(
        &self,
        context: WorkflowExecutionContext,
        input: HashMap<VertexId, Value>,
    ) -> WorkflowRunResult {
        debug!(workflow = %self.id, execution = %context.execution_id, "instantiating vertex actors");
        let coordinator =
            WorkflowCoordinatorActor::new(self.id.clone(), self.instantiate(), self.config.clone());
        coordinator.execute_workflow(context, input).await
    }

    /// Run the workflow and render the outcome as a Mermaid diagram
    pub async fn execute_with_results(
        &self,
        context: WorkflowExecutionContext,
        input: HashMap<VertexId, Value>,
    ) -> (WorkflowRunResult, String) {
        let run = self.execute(context, input).await;
        let diagram = self.to_mermaid_with_run(&run);
        (run, diagram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::FunctionComputation;
    use crate::workflow::WorkflowBuilder;
    use serde_json::json;

    fn passthrough() -> FunctionComputation {
        FunctionComputation::new(|input, _| async move { Ok(input) })
    }

    /// fetch → (clean, enrich) → report, plus an isolated audit vertex
    fn workflow() -> BuiltWorkflow {
        WorkflowBuilder::new()
            .with_id("etl")
            .add_vertex_spec("fetch", passthrough())
            .add_vertex_spec("clean", passthrough())
            .add_vertex_spec("enrich", passthrough())
            .add_vertex_spec("report", passthrough())
            .add_vertex_spec("audit", passthrough())
            .add_edge("fetch", "clean")
            .add_edge("fetch", "enrich")
            .add_edge("clean", "report")
            .add_edge("enrich", "report")
            .build()
            .unwrap()
    }

    #[test]
    fn test_execution_order_levels() {
        let order = workflow().execution_order();
        assert_eq!(
            order,
            vec![
                vec![VertexId::new("audit"), VertexId::new("fetch")],
                vec![VertexId::new("clean"), VertexId::new("enrich")],
                vec![VertexId::new("report")],
            ]
        );
    }

    #[test]
    fn test_neighbours() {
        let workflow = workflow();
        assert_eq!(
            workflow.dependents(&VertexId::new("fetch")),
            vec![VertexId::new("clean"), VertexId::new("enrich")]
        );
        assert_eq!(
            workflow.dependencies(&VertexId::new("report")),
            vec![VertexId::new("clean"), VertexId::new("enrich")]
        );
        assert!(workflow.dependencies(&VertexId::new("missing")).is_empty());
    }

    #[test]
    fn test_stats() {
        let stats = workflow().stats();
        assert_eq!(stats.vertex_count, 5);
        assert_eq!(stats.edge_count, 4);
        assert_eq!(stats.root_count, 2);
        assert_eq!(stats.leaf_count, 2);
        assert_eq!(stats.depth, 3);
        assert_eq!(stats.max_parallelism, 2);
        assert_eq!(stats.max_fan_out, 2);
        assert_eq!(stats.max_fan_in, 2);
    }

    #[test]
    fn test_definition_serializes() {
        let definition = workflow().to_definition();
        let value = serde_json::to_value(&definition).unwrap();
        assert_eq!(value["id"], json!("etl"));
        assert_eq!(value["vertices"][0]["id"], json!("audit"));
        assert_eq!(value["vertices"][0]["kind"], json!("function"));
        assert_eq!(value["edges"].as_array().unwrap().len(), 4);

        let back: WorkflowDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, definition);
    }

    #[test]
    fn test_mermaid() {
        let diagram = workflow().to_mermaid();
        assert!(diagram.starts_with("graph TD"));
        assert!(diagram.contains("    fetch([fetch])"));
        assert!(diagram.contains("    clean[clean]"));
        assert!(diagram.contains("    report(report)"));
        assert!(diagram.contains("    fetch --> clean"));
        assert!(!diagram.contains("classDef"));
    }

    #[test]
    fn test_mermaid_keeps_colliding_ids_apart() {
        let workflow = WorkflowBuilder::new()
            .with_id("collide")
            .add_vertex_spec("load-users", passthrough())
            .add_vertex_spec("load_users", passthrough())
            .add_edge("load-users", "load_users")
            .build()
            .unwrap();

        let diagram = workflow.to_mermaid();
        assert!(diagram.contains("    load_users([load-users])"));
        assert!(diagram.contains("    load_users_2(load_users)"));
        assert!(diagram.contains("    load_users --> load_users_2"));
    }

    #[tokio::test]
    async fn test_execute_twice_uses_fresh_actors() {
        let workflow = workflow();
        let input = HashMap::from([(VertexId::new("fetch"), json!({"rows": 3}))]);

        for _ in 0..2 {
            let ctx = WorkflowExecutionContext::new(workflow.id());
            let run = workflow.execute(ctx, input.clone()).await;
            assert!(run.is_completed());
            assert_eq!(run.completed_vertices.len(), 5);
            assert_eq!(run.output("report"), Some(&json!({"rows": 3})));
            assert_eq!(run.output("audit"), Some(&json!({})));
        }
    }

    #[tokio::test]
    async fn test_execute_with_results_colours_states() {
        let workflow = WorkflowBuilder::new()
            .with_id("broken")
            .add_function_vertex("load", |_, _| async { anyhow::bail!("no such table") })
            .add_function_vertex("sum", |input, _| async move { Ok(input) })
            .add_edge("load", "sum")
            .build()
            .unwrap();

        let (run, diagram) = workflow
            .execute_with_results(WorkflowExecutionContext::new("broken"), HashMap::new())
            .await;
        assert!(run.is_failed());
        assert!(diagram.contains("load([load]):::failed"));
        assert!(diagram.contains("sum(sum):::pending"));
        assert!(diagram.contains("classDef failed"));
    }
}
