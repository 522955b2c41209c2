//! Dependency graph data model.
//!
//! Nodes are keyed by repo-relative path; edges are stored by
//! `(source, target)` pairs, never by object reference, so cycles and
//! shared dependencies are unremarkable.

use crate::locks::Lock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Repo-relative path.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One import relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    /// Always `"import"`; kept explicit for graph consumers.
    pub label: String,
}

impl GraphEdge {
    pub fn import(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: "import".to_string(),
        }
    }

    /// Dedup key.
    pub fn key(&self) -> String {
        format!("{}=>{}", self.source, self.target)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub generated_at_ms: i64,
    pub files_processed: u64,
    pub edges_found: u64,
}

/// The stored graph for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Head commit the graph was computed at.
    pub version: String,
    pub metadata: GraphMetadata,
}

impl DependencyGraph {
    /// Sort nodes by id and edges by `(source, target)` so identical
    /// inputs serialize identically.
    pub fn sort(&mut self) {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.edges
            .sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.target.cmp(&b.target)));
    }

    /// Undirected adjacency of `paths`: every node reachable over one edge
    /// in either direction, excluding the paths themselves.
    pub fn neighbors_of(&self, paths: &[String]) -> HashSet<String> {
        let requested: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let mut neighbors = HashSet::new();
        for edge in &self.edges {
            if requested.contains(edge.source.as_str()) && !requested.contains(edge.target.as_str())
            {
                neighbors.insert(edge.target.clone());
            }
            if requested.contains(edge.target.as_str()) && !requested.contains(edge.source.as_str())
            {
                neighbors.insert(edge.source.clone());
            }
        }
        neighbors
    }

    /// Files that import any of `released` and are not themselves released.
    pub fn orphaned_dependents(&self, released: &[String]) -> Vec<String> {
        let released_set: HashSet<&str> = released.iter().map(String::as_str).collect();
        let mut orphaned: Vec<String> = self
            .edges
            .iter()
            .filter(|e| {
                released_set.contains(e.target.as_str()) && !released_set.contains(e.source.as_str())
            })
            .map(|e| e.source.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        orphaned.sort();
        orphaned
    }
}

/// Graph response shape: the stored graph plus a fresh lock snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub locks: HashMap<String, Lock>,
    pub version: String,
    pub metadata: GraphMetadata,
}

impl GraphView {
    pub fn new(graph: DependencyGraph, locks: HashMap<String, Lock>) -> Self {
        Self {
            nodes: graph.nodes,
            edges: graph.edges,
            locks,
            version: graph.version,
            metadata: graph.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_edges(edges: &[(&str, &str)]) -> DependencyGraph {
        DependencyGraph {
            edges: edges
                .iter()
                .map(|(s, t)| GraphEdge::import(*s, *t))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn neighbors_are_undirected() {
        let graph = graph_with_edges(&[("src/a.ts", "src/dep.ts"), ("src/user.ts", "src/a.ts")]);
        let neighbors = graph.neighbors_of(&["src/a.ts".to_string()]);
        assert!(neighbors.contains("src/dep.ts"));
        assert!(neighbors.contains("src/user.ts"));
        assert!(!neighbors.contains("src/a.ts"));
    }

    #[test]
    fn neighbors_survive_cycles() {
        let graph = graph_with_edges(&[("a.ts", "b.ts"), ("b.ts", "a.ts")]);
        let neighbors = graph.neighbors_of(&["a.ts".to_string()]);
        assert_eq!(neighbors.len(), 1);
        assert!(neighbors.contains("b.ts"));
    }

    #[test]
    fn orphaned_dependents_exclude_released() {
        let graph = graph_with_edges(&[
            ("src/app.ts", "src/auth.ts"),
            ("src/auth.ts", "src/util.ts"),
        ]);
        let orphaned = graph.orphaned_dependents(&["src/auth.ts".to_string()]);
        assert_eq!(orphaned, vec!["src/app.ts".to_string()]);
    }

    #[test]
    fn sort_is_deterministic() {
        let mut a = graph_with_edges(&[("b", "c"), ("a", "z"), ("a", "b")]);
        a.nodes = vec![
            GraphNode { id: "z".into(), language: None, size: None },
            GraphNode { id: "a".into(), language: None, size: None },
        ];
        a.sort();
        assert_eq!(a.nodes[0].id, "a");
        assert_eq!(a.edges[0].key(), "a=>b");
        assert_eq!(a.edges[1].key(), "a=>z");
        assert_eq!(a.edges[2].key(), "b=>c");
    }
}
