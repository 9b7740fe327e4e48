//! Mermaid diagram helpers
//!
//! Vertex shapes follow the vertex's position in the graph:
//!
//! | Role  | Shape             | Mermaid Syntax |
//! |-------|-------------------|----------------|
//! | Root  | Stadium           | `id([label])`  |
//! | Inner | Rectangle         | `id[label]`    |
//! | Leaf  | Rounded Rectangle | `id(label)`    |

use std::collections::{HashMap, HashSet};

use crate::model::{VertexId, VertexState};

/// Position of a vertex in the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexRole {
    /// No dependencies (also used for isolated vertices)
    Root,
    Inner,
    /// No dependents
    Leaf,
}

// ============================================================================
// ID Sanitization
// ============================================================================

/// Mermaid node ids may only contain alphanumerics and underscores
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Mermaid node id of every vertex in a diagram
///
/// Sanitizing can map distinct vertex ids onto the same node id (`a-b` and
/// `a_b`); later vertices then get a numeric suffix (`a_b_2`).
#[derive(Debug, Clone, Default)]
pub struct NodeIds {
    ids: HashMap<VertexId, String>,
}

impl NodeIds {
    /// Assign node ids in iteration order
    pub fn new<'a>(vertices: impl IntoIterator<Item = &'a VertexId>) -> Self {
        let mut taken = HashSet::new();
        let mut ids = HashMap::new();

        for vertex in vertices {
            if ids.contains_key(vertex) {
                continue;
            }
            let base = sanitize_id(vertex.as_str());
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !taken.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            ids.insert(vertex.clone(), candidate);
        }

        Self { ids }
    }

    /// Node id for `vertex`; unknown vertices fall back to plain sanitizing
    pub fn get(&self, vertex: &VertexId) -> String {
        self.ids
            .get(vertex)
            .cloned()
            .unwrap_or_else(|| sanitize_id(vertex.as_str()))
    }
}

/// Labels are quoted-free, so strip the characters Mermaid treats as syntax
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '[' | ']' | '(' | ')' | '{' | '}' | '"' | '|' => ' ',
            c => c,
        })
        .collect()
}

// ============================================================================
// Node and Edge Rendering
// ============================================================================

/// Node labelled with the vertex id, drawn under `node_id`
pub fn render_node(id: &VertexId, node_id: &str, role: VertexRole) -> String {
    let label = sanitize_label(id.as_str());

    match role {
        VertexRole::Root => format!("    {}([{}])", node_id, label),
        VertexRole::Inner => format!("    {}[{}]", node_id, label),
        VertexRole::Leaf => format!("    {}({})", node_id, label),
    }
}

/// Node with a CSS class for its final state
pub fn render_node_with_state(id: &VertexId, node_id: &str, role: VertexRole, state: VertexState) -> String {
    let class = match state {
        VertexState::Pending => "pending",
        VertexState::Executing => "executing",
        VertexState::Completed => "completed",
        VertexState::Failed => "failed",
    };
    format!("{}:::{}", render_node(id, node_id, role), class)
}

/// Solid arrow, or a labelled dotted arrow when the edge carries a label
pub fn render_edge(from_node: &str, to_node: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("    {} -. \"{}\" .-> {}", from_node, sanitize_label(label), to_node),
        None => format!("    {} --> {}", from_node, to_node),
    }
}

/// Class definitions for vertex states
pub const STYLE_DEFS: &str = r#"
    classDef pending fill:#F5F5F5,stroke:#A9A9A9,stroke-width:1px,stroke-dasharray:3
    classDef executing fill:#FFE4B5,stroke:#FF8C00,stroke-width:2px
    classDef completed fill:#90EE90,stroke:#228B22,stroke-width:1px
    classDef failed fill:#FFB6C1,stroke:#B22222,stroke-width:2px
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("extract"), "extract");
        assert_eq!(sanitize_id("load-users"), "load_users");
        assert_eq!(sanitize_id("step.2"), "step_2");
        assert_eq!(sanitize_id("a/b c"), "a_b_c");
    }

    #[test]
    fn test_node_ids_resolve_collisions() {
        let vertices = [
            VertexId::new("a-b"),
            VertexId::new("a_b"),
            VertexId::new("a.b"),
            VertexId::new("c"),
        ];
        let nodes = NodeIds::new(&vertices);

        assert_eq!(nodes.get(&vertices[0]), "a_b");
        assert_eq!(nodes.get(&vertices[1]), "a_b_2");
        assert_eq!(nodes.get(&vertices[2]), "a_b_3");
        assert_eq!(nodes.get(&vertices[3]), "c");
        assert_eq!(nodes.get(&VertexId::new("x-y")), "x_y");
    }

    #[test]
    fn test_node_ids_never_reuse_a_taken_id() {
        // "a_b_2" is a real vertex, so the second "a_b" collision skips it
        let vertices = [VertexId::new("a_b"), VertexId::new("a_b_2"), VertexId::new("a-b")];
        let nodes = NodeIds::new(&vertices);

        let assigned: HashSet<String> = vertices.iter().map(|v| nodes.get(v)).collect();
        assert_eq!(assigned.len(), 3);
        assert_eq!(nodes.get(&vertices[2]), "a_b_3");
    }

    #[test]
    fn test_render_node_shapes() {
        let id = VertexId::new("fetch");
        assert_eq!(render_node(&id, "fetch", VertexRole::Root), "    fetch([fetch])");
        assert_eq!(render_node(&id, "fetch", VertexRole::Inner), "    fetch[fetch]");
        assert_eq!(render_node(&id, "fetch", VertexRole::Leaf), "    fetch(fetch)");
    }

    #[test]
    fn test_render_node_keeps_original_label() {
        let id = VertexId::new("load-users");
        assert_eq!(render_node(&id, "load_users", VertexRole::Inner), "    load_users[load-users]");
    }

    #[test]
    fn test_render_node_with_state() {
        let id = VertexId::new("sum");
        let failed = render_node_with_state(&id, "sum", VertexRole::Leaf, VertexState::Failed);
        assert_eq!(failed, "    sum(sum):::failed");
        let done = render_node_with_state(&id, "sum", VertexRole::Leaf, VertexState::Completed);
        assert!(done.ends_with(":::completed"));
    }

    #[test]
    fn test_render_edges() {
        assert_eq!(render_edge("split_data", "train", None), "    split_data --> train");
        assert_eq!(
            render_edge("split_data", "train", Some("80%")),
            "    split_data -. \"80%\" .-> train"
        );
    }
}
