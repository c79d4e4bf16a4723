//! Indexed semantic graph backed by petgraph.
//!
//! Node ids map one-to-one onto petgraph node indices; each petgraph edge
//! carries the position of its [`Edge`] in declaration order so adjacency
//! queries can return edges in a stable order.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::GraphError;

use super::{Edge, GraphData, NodeData, NodeId};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// A rooted, directed, labeled multigraph over one sentence.
#[derive(Debug, Clone, Default)]
pub struct SemanticGraph {
    /// Nodes carry their own id; edges carry their declaration position.
    graph: DiGraph<NodeId, usize>,
    /// Concept label per node.
    concepts: Vec<String>,
    /// External name per node.
    names: Vec<String>,
    /// External name → node.
    name_index: HashMap<String, NodeId>,
    /// Edges in declaration order.
    edges: Vec<Edge>,
    root: Option<NodeId>,
}

impl SemanticGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node. Names must be unique.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        concept: impl Into<String>,
    ) -> GraphResult<NodeId> {
        let name = name.into();
        if self.name_index.contains_key(&name) {
            return Err(GraphError::DuplicateNodeName { name });
        }
        let id = NodeId(self.concepts.len() as u32);
        let idx = self.graph.add_node(id);
        debug_assert_eq!(idx.index(), id.index());
        self.concepts.push(concept.into());
        self.name_index.insert(name.clone(), id);
        self.names.push(name);
        Ok(id)
    }

    /// Declare an edge between two existing nodes.
    pub fn add_edge(
        &mut self,
        source: NodeId,
        relation: impl Into<String>,
        target: NodeId,
    ) -> GraphResult<Edge> {
        self.check_node(source)?;
        self.check_node(target)?;
        let edge = Edge::new(source, relation, target);
        let position = self.edges.len();
        self.graph.add_edge(
            NodeIndex::new(source.index()),
            NodeIndex::new(target.index()),
            position,
        );
        self.edges.push(edge.clone());
        Ok(edge)
    }

    /// Mark the top node of the graph.
    pub fn set_root(&mut self, node: NodeId) -> GraphResult<()> {
        self.check_node(node)?;
        self.root = Some(node);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.concepts.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.concepts.len() as u32).map(NodeId)
    }

    /// All edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        node.index() < self.concepts.len()
    }

    /// O(out-degree) membership test.
    pub fn contains_edge(&self, edge: &Edge) -> bool {
        self.contains_node(edge.source)
            && self
                .graph
                .edges_directed(NodeIndex::new(edge.source.index()), Direction::Outgoing)
                .any(|e| self.edges[*e.weight()] == *edge)
    }

    /// Fail with [`GraphError::ForeignNode`] unless `node` belongs to this graph.
    pub fn check_node(&self, node: NodeId) -> GraphResult<()> {
        if self.contains_node(node) {
            Ok(())
        } else {
            Err(GraphError::ForeignNode { node: node.0 })
        }
    }

    /// Fail with [`GraphError::ForeignEdge`] unless `edge` belongs to this graph.
    pub fn check_edge(&self, edge: &Edge) -> GraphResult<()> {
        if self.contains_edge(edge) {
            Ok(())
        } else {
            Err(GraphError::ForeignEdge {
                source_name: self.display_name(edge.source),
                relation: edge.relation.clone(),
                target_name: self.display_name(edge.target),
            })
        }
    }

    /// Concept label of a node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is foreign to this graph. Inputs are validated with
    /// [`check_node`](Self::check_node) when alignments are loaded or built.
    pub fn concept(&self, node: NodeId) -> &str {
        &self.concepts[node.index()]
    }

    /// External name of a node. Same panic contract as [`concept`](Self::concept).
    pub fn name(&self, node: NodeId) -> &str {
        &self.names[node.index()]
    }

    fn display_name(&self, node: NodeId) -> String {
        self.names
            .get(node.index())
            .cloned()
            .unwrap_or_else(|| node.to_string())
    }

    /// Look up a node by its external name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.name_index.get(name).copied()
    }

    /// Look up a node by name, failing on unknown names.
    pub fn require_node(&self, name: &str) -> GraphResult<NodeId> {
        self.node_by_name(name)
            .ok_or_else(|| GraphError::UnknownNodeName { name: name.into() })
    }

    fn adjacent_edges(&self, node: NodeId, direction: Direction) -> Vec<&Edge> {
        if !self.contains_node(node) {
            return vec![];
        }
        let mut positions: Vec<usize> = self
            .graph
            .edges_directed(NodeIndex::new(node.index()), direction)
            .map(|e| *e.weight())
            .collect();
        positions.sort_unstable();
        positions.into_iter().map(|p| &self.edges[p]).collect()
    }

    /// Edges pointing into `node`, in declaration order.
    pub fn incoming(&self, node: NodeId) -> Vec<&Edge> {
        self.adjacent_edges(node, Direction::Incoming)
    }

    /// Edges leaving `node`, in declaration order.
    pub fn outgoing(&self, node: NodeId) -> Vec<&Edge> {
        self.adjacent_edges(node, Direction::Outgoing)
    }

    /// Distinct parents of `node`, ascending.
    pub fn parents(&self, node: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.incoming(node).iter().map(|e| e.source).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Distinct children of `node`, ascending.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.outgoing(node).iter().map(|e| e.target).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Number of incoming edges.
    pub fn in_degree(&self, node: NodeId) -> usize {
        if !self.contains_node(node) {
            return 0;
        }
        self.graph
            .edges_directed(NodeIndex::new(node.index()), Direction::Incoming)
            .count()
    }

    /// True if `a` and `b` share an edge in either direction.
    pub fn are_adjacent(&self, a: NodeId, b: NodeId) -> bool {
        self.contains_node(a)
            && self.contains_node(b)
            && (self.graph.contains_edge(NodeIndex::new(a.index()), NodeIndex::new(b.index()))
                || self.graph.contains_edge(NodeIndex::new(b.index()), NodeIndex::new(a.index())))
    }

    /// Nodes with more than one incoming edge.
    pub fn reentrant_nodes(&self) -> Vec<NodeId> {
        self.nodes().filter(|&n| self.in_degree(n) > 1).collect()
    }

    /// Edges pointing into a reentrant node.
    pub fn reentrant_edges(&self) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| self.in_degree(e.target) > 1)
            .collect()
    }

    /// Edges with both endpoints in `nodes`, in declaration order.
    pub fn induced_edges(&self, nodes: &[NodeId]) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| nodes.contains(&e.source) && nodes.contains(&e.target))
            .collect()
    }

    /// Nodes carrying the given concept, ascending.
    pub fn nodes_with_concept(&self, concept: &str) -> Vec<NodeId> {
        self.nodes().filter(|&n| self.concept(n) == concept).collect()
    }

    /// Build from interchange form.
    pub fn from_data(data: &GraphData) -> GraphResult<Self> {
        let mut graph = Self::new();
        for node in &data.nodes {
            graph.add_node(node.id.clone(), node.concept.clone())?;
        }
        for (source, relation, target) in &data.edges {
            let s = graph.require_node(source)?;
            let t = graph.require_node(target)?;
            graph.add_edge(s, relation.clone(), t)?;
        }
        match &data.root {
            Some(root) => {
                let root = graph.require_node(root)?;
                graph.set_root(root)?;
            }
            None if !graph.is_empty() => return Err(GraphError::MissingRoot),
            None => {}
        }
        Ok(graph)
    }

    /// Convert back to interchange form.
    pub fn to_data(&self) -> GraphData {
        GraphData {
            root: self.root.map(|r| self.name(r).to_string()),
            nodes: self
                .nodes()
                .map(|n| NodeData {
                    id: self.name(n).to_string(),
                    concept: self.concept(n).to_string(),
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .map(|e| {
                    (
                        self.name(e.source).to_string(),
                        e.relation.clone(),
                        self.name(e.target).to_string(),
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `see-01 :ARG0 John :ARG1 Mary`, plus a reentrant `want-01` frame.
    fn sample() -> (SemanticGraph, NodeId, NodeId, NodeId) {
        let mut g = SemanticGraph::new();
        let s = g.add_node("s", "see-01").unwrap();
        let j = g.add_node("j", "John").unwrap();
        let m = g.add_node("m", "Mary").unwrap();
        g.add_edge(s, ":ARG0", j).unwrap();
        g.add_edge(s, ":ARG1", m).unwrap();
        g.set_root(s).unwrap();
        (g, s, j, m)
    }

    #[test]
    fn adjacency_queries() {
        let (g, s, j, m) = sample();
        assert_eq!(g.children(s), vec![j, m]);
        assert_eq!(g.parents(j), vec![s]);
        assert!(g.parents(s).is_empty());
        assert_eq!(g.outgoing(s)[0].relation, ":ARG0");
        assert!(g.are_adjacent(j, s));
        assert!(!g.are_adjacent(j, m));
    }

    #[test]
    fn foreign_nodes_and_edges_are_rejected() {
        let (mut g, s, j, _) = sample();
        let ghost = NodeId(42);
        assert!(matches!(
            g.add_edge(s, ":mod", ghost),
            Err(GraphError::ForeignNode { node: 42 })
        ));
        assert!(g.check_edge(&Edge::new(s, ":ARG0", j)).is_ok());
        assert!(matches!(
            g.check_edge(&Edge::new(j, ":ARG0", s)),
            Err(GraphError::ForeignEdge { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (mut g, ..) = sample();
        assert!(matches!(
            g.add_node("s", "see-01"),
            Err(GraphError::DuplicateNodeName { .. })
        ));
    }

    #[test]
    fn reentrancies() {
        let (mut g, s, j, _) = sample();
        let w = g.add_node("w", "want-01").unwrap();
        g.add_edge(w, ":ARG0", j).unwrap();
        g.add_edge(w, ":ARG1", s).unwrap();
        assert_eq!(g.reentrant_nodes(), vec![j]);
        assert_eq!(g.reentrant_edges().len(), 2);
        assert_eq!(g.in_degree(j), 2);
    }

    #[test]
    fn data_round_trip() {
        let (g, ..) = sample();
        let data = g.to_data();
        let back = SemanticGraph::from_data(&data).unwrap();
        assert_eq!(back.to_data(), data);
        assert_eq!(back.root().map(|r| back.name(r).to_string()), Some("s".into()));
    }

    #[test]
    fn missing_root_is_an_error() {
        let data = GraphData {
            root: None,
            nodes: vec![NodeData {
                id: "a".into(),
                concept: "dog".into(),
            }],
            edges: vec![],
        };
        assert!(matches!(
            SemanticGraph::from_data(&data),
            Err(GraphError::MissingRoot)
        ));
    }
}
