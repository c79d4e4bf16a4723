//! Canonical fragment labels.
//!
//! The fragment vocabulary is open-ended: every new node set or edge set a
//! span can own produces a new label. Labels are therefore structural values
//! with sorted contents, so isomorphic fragments compare equal and hash alike
//! regardless of node identity or insertion order.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::alignment::ReentrancyKind;
use crate::graph::{Edge, NodeId, SemanticGraph};

static ARGUMENT_RELATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:(ARG\d+|op\d+|snt\d+)$").unwrap());

/// Relations whose `-of` suffix is part of the name, not an inversion.
const NON_INVERTED: [&str; 3] = [":consist-of", ":prep-out-of", ":prep-on-behalf-of"];

/// True if `relation` is the inverse form of another relation.
pub fn is_inverse(relation: &str) -> bool {
    relation.ends_with("-of") && !NON_INVERTED.contains(&relation)
}

/// Strip an inversion suffix: `:ARG0-of` becomes `:ARG0`.
pub fn normalize_relation(relation: &str) -> &str {
    if is_inverse(relation) {
        &relation[..relation.len() - 3]
    } else {
        relation
    }
}

/// Rewrite an inverse edge in its canonical direction.
pub fn normalize_edge(edge: &Edge) -> Edge {
    if is_inverse(&edge.relation) {
        Edge::new(edge.target, normalize_relation(&edge.relation), edge.source)
    } else {
        edge.clone()
    }
}

/// Core-argument relations, realized by their head rather than by a word
/// of their own.
pub fn is_argument_marking(relation: &str) -> bool {
    let relation = normalize_relation(relation);
    ARGUMENT_RELATION.is_match(relation) || matches!(relation, ":domain" | ":poss" | ":part")
}

/// An internal edge described by concepts rather than node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeLabel {
    pub source: String,
    pub relation: String,
    pub target: String,
}

impl EdgeLabel {
    pub fn of(graph: &SemanticGraph, edge: &Edge) -> Self {
        Self {
            source: graph.concept(edge.source).to_string(),
            relation: edge.relation.clone(),
            target: graph.concept(edge.target).to_string(),
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.source, self.relation, self.target)
    }
}

/// Label of a node fragment: its concepts and internal edges, both sorted.
///
/// The empty fragment is the null label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubgraphLabel {
    concepts: Vec<String>,
    edges: Vec<EdgeLabel>,
}

impl SubgraphLabel {
    pub fn of(graph: &SemanticGraph, nodes: &[NodeId]) -> Self {
        let mut concepts: Vec<String> = nodes
            .iter()
            .map(|&n| graph.concept(n).to_string())
            .collect();
        concepts.sort();
        let mut edges: Vec<EdgeLabel> = graph
            .induced_edges(nodes)
            .into_iter()
            .map(|e| EdgeLabel::of(graph, e))
            .collect();
        edges.sort();
        Self { concepts, edges }
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn concepts(&self) -> &[String] {
        &self.concepts
    }

    pub fn edges(&self) -> &[EdgeLabel] {
        &self.edges
    }
}

impl fmt::Display for SubgraphLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("<null>");
        }
        let parts: Vec<String> = self
            .concepts
            .iter()
            .map(|c| c.replace(' ', "_"))
            .chain(self.edges.iter().map(|e| e.to_string().replace(' ', "_")))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Independent pieces of a node fragment, used when the whole fragment was
/// never observed with a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgraphParts {
    /// Concepts of members with no parent inside the fragment.
    pub roots: Vec<String>,
    /// Internal edges; each is scored conditioned on its source concept.
    pub edges: Vec<EdgeLabel>,
}

impl SubgraphParts {
    pub fn of(graph: &SemanticGraph, nodes: &[NodeId]) -> Self {
        let roots = crate::graph::traverse::local_roots(graph, nodes)
            .into_iter()
            .map(|n| graph.concept(n).to_string())
            .collect();
        let edges = graph
            .induced_edges(nodes)
            .into_iter()
            .map(|e| EdgeLabel::of(graph, e))
            .collect();
        Self { roots, edges }
    }
}

/// Endpoint of a relation edge relative to the span's own node fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Position of the node among the fragment's nodes, by id.
    Internal(usize),
    /// A node realized elsewhere.
    External,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(i) => write!(f, "n{i}"),
            Self::External => f.write_str("v"),
        }
    }
}

/// A normalized relation with its endpoints reduced to roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleEdge {
    pub source: Role,
    pub relation: String,
    pub target: Role,
}

/// Label of a relation record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationLabel {
    /// Span with neither nodes nor relations.
    Null,
    /// Span with nodes but no relations.
    NoArgs,
    Edges(Vec<RoleEdge>),
}

impl RelationLabel {
    /// `fragment` is the node set of the span's subgraph record.
    pub fn of(fragment: &[NodeId], edges: &[Edge]) -> Self {
        if edges.is_empty() {
            return if fragment.is_empty() {
                Self::Null
            } else {
                Self::NoArgs
            };
        }
        let mut internal: Vec<NodeId> = fragment.to_vec();
        internal.sort_unstable();
        let role = |n: NodeId| match internal.binary_search(&n) {
            Ok(i) => Role::Internal(i),
            Err(_) => Role::External,
        };
        let mut out: Vec<RoleEdge> = edges
            .iter()
            .map(|e| {
                let e = normalize_edge(e);
                RoleEdge {
                    source: role(e.source),
                    relation: e.relation,
                    target: role(e.target),
                }
            })
            .collect();
        out.sort();
        Self::Edges(out)
    }
}

impl fmt::Display for RelationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::NoArgs => f.write_str("<no_args>"),
            Self::Edges(edges) => {
                let parts: Vec<String> = edges
                    .iter()
                    .map(|e| format!("{}_{}_{}", e.source, e.relation, e.target))
                    .collect();
                f.write_str(&parts.join(" "))
            }
        }
    }
}

/// Label of a reentrancy record: its subtype and, for structural subtypes,
/// the normalized relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReentrancyLabel {
    pub kind: ReentrancyKind,
    pub relation: Option<String>,
}

impl ReentrancyLabel {
    pub fn of(kind: ReentrancyKind, edges: &[Edge]) -> Self {
        let relation = match kind {
            ReentrancyKind::Primary | ReentrancyKind::Repetition | ReentrancyKind::Coref => None,
            _ => edges
                .first()
                .map(|e| normalize_relation(&e.relation).to_string()),
        };
        Self { kind, relation }
    }
}

impl fmt::Display for ReentrancyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(r) => write!(f, "{}:{}", self.kind.as_str(), r),
            None => f.write_str(self.kind.as_str()),
        }
    }
}
