//! Semantic graph: the rooted, labeled multigraph an alignment is made against.
//!
//! - **Index** ([`SemanticGraph`]): `petgraph` storage with O(degree) parent/child lookups
//! - **Traversal** ([`traverse`]): connectivity checks and rooted components for node sets
//!
//! Graphs are built once per sentence and are read-only during alignment.

pub mod index;
pub mod traverse;

use serde::{Deserialize, Serialize};

pub use index::{GraphResult, SemanticGraph};

/// Identifier of a node within one sentence's graph.
///
/// Ids are dense and assigned in declaration order, so they double as the
/// deterministic tie-break order for nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A directed, labeled edge `(source, relation, target)`.
///
/// Ordering is lexicographic on the triple, which is the tie-break order the
/// engine uses for edge items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    /// Parent node.
    pub source: NodeId,
    /// Relation label, including the leading colon (e.g. `:ARG0`).
    pub relation: String,
    /// Child node.
    pub target: NodeId,
}

impl Edge {
    /// Create a new edge.
    pub fn new(source: NodeId, relation: impl Into<String>, target: NodeId) -> Self {
        Self {
            source,
            relation: relation.into(),
            target,
        }
    }

    /// True if `node` is either endpoint.
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

/// A declared node in interchange form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// External node name, unique within the graph (e.g. `s`, `j`, `m2`).
    pub id: String,
    /// Concept label (e.g. `see-01`, `John`).
    pub concept: String,
}

/// A whole graph in interchange form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    /// Name of the root node. Required when the graph has nodes.
    #[serde(default)]
    pub root: Option<String>,
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    /// Edges as `(source name, relation, target name)` triples.
    #[serde(default)]
    pub edges: Vec<(String, String, String)>,
}
