//! Alignment records and collections.
//!
//! An [`Alignment`] ties a token span to the graph fragment it realizes: a set
//! of nodes (subgraph records) or edges (relation and reentrancy records).
//! Records are replaced wholesale when their content changes; scoring always
//! works on a candidate copy, never on the committed record.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::error::{AlignResult, CorpusError};
use crate::graph::{Edge, NodeId};
use crate::sentence::{Sentence, Span};

/// Why a reentrant edge is realized where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReentrancyKind {
    /// The ordinary, non-reentrant reading of the node.
    Primary,
    Coordination,
    Comparative,
    Coref,
    Repetition,
    Control,
    AdjunctControl,
    UnmarkedAdjunctControl,
    /// Catch-all when no structural pattern applies.
    Pragmatic,
}

impl ReentrancyKind {
    pub const ALL: [ReentrancyKind; 9] = [
        Self::Primary,
        Self::Coordination,
        Self::Comparative,
        Self::Coref,
        Self::Repetition,
        Self::Control,
        Self::AdjunctControl,
        Self::UnmarkedAdjunctControl,
        Self::Pragmatic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Coordination => "coordination",
            Self::Comparative => "comparative",
            Self::Coref => "coref",
            Self::Repetition => "repetition",
            Self::Control => "control",
            Self::AdjunctControl => "adjunct-control",
            Self::UnmarkedAdjunctControl => "unmarked-adjunct-control",
            Self::Pragmatic => "pragmatic",
        }
    }
}

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlignmentKind {
    Subgraph,
    Relation,
    Reentrancy(ReentrancyKind),
    /// Secondary, lower-confidence attachment of a duplicate-labeled node.
    DuplicateSubgraph,
}

impl AlignmentKind {
    /// Everything except duplicate attachments is a primary record.
    pub fn is_primary(self) -> bool {
        !matches!(self, Self::DuplicateSubgraph)
    }
}

impl fmt::Display for AlignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subgraph => f.write_str("subgraph"),
            Self::Relation => f.write_str("relation"),
            Self::Reentrancy(kind) => write!(f, "reentrancy:{}", kind.as_str()),
            Self::DuplicateSubgraph => f.write_str("dupl-subgraph"),
        }
    }
}

impl FromStr for AlignmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subgraph" => Ok(Self::Subgraph),
            "relation" => Ok(Self::Relation),
            "dupl-subgraph" => Ok(Self::DuplicateSubgraph),
            _ => s
                .strip_prefix("reentrancy:")
                .and_then(|sub| ReentrancyKind::ALL.into_iter().find(|k| k.as_str() == sub))
                .map(Self::Reentrancy)
                .ok_or_else(|| format!("unknown alignment type \"{s}\"")),
        }
    }
}

/// One span and the fragment it realizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub kind: AlignmentKind,
    pub span: Span,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<Edge>,
}

impl Alignment {
    /// An empty record: the span has no graph realization.
    pub fn new(kind: AlignmentKind, span: Span) -> Self {
        Self {
            kind,
            span,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Copy with `node` added (no-op if already owned).
    pub fn with_node(&self, node: NodeId) -> Self {
        let mut next = self.clone();
        if !next.nodes.contains(&node) {
            next.nodes.push(node);
        }
        next
    }

    /// Copy with `edge` added (no-op if already owned).
    pub fn with_edge(&self, edge: &Edge) -> Self {
        let mut next = self.clone();
        if !next.edges.contains(edge) {
            next.edges.push(edge.clone());
        }
        next
    }

    /// Copy with the node set replaced.
    pub fn with_nodes(&self, nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn owns_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn owns_edge(&self, edge: &Edge) -> bool {
        self.edges.contains(edge)
    }

    /// Check that the span is in the partition and the fragment is in the graph.
    pub fn validate(&self, sentence: &Sentence) -> AlignResult<()> {
        if sentence.span_index(self.span).is_none() {
            return Err(CorpusError::InvalidSpan {
                sentence: sentence.id().to_string(),
                start: self.span.start,
                end: self.span.end,
            }
            .into());
        }
        for &node in &self.nodes {
            sentence.graph().check_node(node)?;
        }
        for edge in &self.edges {
            sentence.graph().check_edge(edge)?;
        }
        Ok(())
    }
}

/// All records for one sentence, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentSet {
    records: Vec<Alignment>,
}

impl AlignmentSet {
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// One empty record of `kind` per span.
    pub fn empty_per_span(sentence: &Sentence, kind: AlignmentKind) -> Self {
        Self {
            records: sentence
                .spans()
                .iter()
                .map(|&span| Alignment::new(kind, span))
                .collect(),
        }
    }

    pub fn records(&self) -> &[Alignment] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Alignment> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Alignment> {
        self.records.get(index)
    }

    pub fn push(&mut self, record: Alignment) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Swap in a new version of the record at `index`.
    pub fn replace(&mut self, index: usize, record: Alignment) {
        self.records[index] = record;
    }

    pub fn retain(&mut self, f: impl FnMut(&Alignment) -> bool) {
        self.records.retain(f);
    }

    /// First record of `kind` anchored on `span`.
    pub fn find(&self, kind: AlignmentKind, span: Span) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.kind == kind && r.span == span)
    }

    /// Primary records owning `node`.
    pub fn node_owners(&self, node: NodeId) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind.is_primary() && r.owns_node(node))
            .map(|(i, _)| i)
            .collect()
    }

    /// The primary record owning `node`, if any.
    pub fn node_owner(&self, node: NodeId) -> Option<&Alignment> {
        self.records
            .iter()
            .find(|r| r.kind.is_primary() && r.owns_node(node))
    }

    /// The primary record owning `edge`, if any.
    pub fn edge_owner(&self, edge: &Edge) -> Option<&Alignment> {
        self.records
            .iter()
            .find(|r| r.kind.is_primary() && r.owns_edge(edge))
    }

    /// True if any record, primary or duplicate, owns `node`.
    pub fn is_node_aligned(&self, node: NodeId) -> bool {
        self.records.iter().any(|r| r.owns_node(node))
    }

    pub fn is_edge_aligned(&self, edge: &Edge) -> bool {
        self.records.iter().any(|r| r.owns_edge(edge))
    }

    /// Drop duplicate records that no longer own anything.
    pub fn remove_empty_duplicates(&mut self) {
        self.records
            .retain(|r| r.kind.is_primary() || !r.is_empty());
    }

    /// Check every record plus the span and ownership invariants.
    ///
    /// Subgraph and relation records may not share a span with a record of the
    /// same kind, and no node or edge may have two primary owners of the same
    /// kind. Reentrancy records are exempt from the span rule.
    pub fn validate(&self, sentence: &Sentence) -> AlignResult<()> {
        let mut spans = std::collections::HashSet::new();
        let mut nodes = std::collections::HashSet::new();
        let mut edges = std::collections::HashSet::new();
        for record in &self.records {
            record.validate(sentence)?;
            if matches!(record.kind, AlignmentKind::Subgraph | AlignmentKind::Relation)
                && !spans.insert((record.kind, record.span))
            {
                return Err(CorpusError::InvalidSpan {
                    sentence: sentence.id().to_string(),
                    start: record.span.start,
                    end: record.span.end,
                }
                .into());
            }
            if !record.kind.is_primary() {
                continue;
            }
            for &node in &record.nodes {
                if !nodes.insert((record.kind, node)) {
                    return Err(CorpusError::DoubleOwnership {
                        sentence: sentence.id().to_string(),
                        item: format!("node {}", sentence.graph().name(node)),
                    }
                    .into());
                }
            }
            for edge in &record.edges {
                if !edges.insert((record.kind, edge.clone())) {
                    let graph = sentence.graph();
                    return Err(CorpusError::DoubleOwnership {
                        sentence: sentence.id().to_string(),
                        item: format!(
                            "edge ({}, {}, {})",
                            graph.name(edge.source),
                            edge.relation,
                            graph.name(edge.target)
                        ),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AlignmentSet {
    type Item = &'a Alignment;
    type IntoIter = std::slice::Iter<'a, Alignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A record in interchange form, with nodes named rather than numbered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentData {
    #[serde(rename = "type")]
    pub kind: String,
    pub tokens: Vec<usize>,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub edges: Vec<(String, String, String)>,
}

/// Alignment sets keyed by sentence id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentCollection {
    sets: BTreeMap<String, AlignmentSet>,
}

impl AlignmentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sentence: impl Into<String>, set: AlignmentSet) {
        self.sets.insert(sentence.into(), set);
    }

    pub fn get(&self, sentence: &str) -> Option<&AlignmentSet> {
        self.sets.get(sentence)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AlignmentSet)> {
        self.sets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Total number of records across all sentences.
    pub fn record_count(&self) -> usize {
        self.sets.values().map(AlignmentSet::len).sum()
    }

    /// Serialize using the node names of each sentence's graph.
    pub fn to_json(&self, corpus: &Corpus) -> AlignResult<String> {
        let mut out: BTreeMap<&str, Vec<AlignmentData>> = BTreeMap::new();
        for (id, set) in &self.sets {
            let sentence = corpus.require(id)?;
            let graph = sentence.graph();
            let records = set
                .iter()
                .map(|r| AlignmentData {
                    kind: r.kind.to_string(),
                    tokens: r.span.tokens().collect(),
                    nodes: r.nodes.iter().map(|&n| graph.name(n).to_string()).collect(),
                    edges: r
                        .edges
                        .iter()
                        .map(|e| {
                            (
                                graph.name(e.source).to_string(),
                                e.relation.clone(),
                                graph.name(e.target).to_string(),
                            )
                        })
                        .collect(),
                })
                .collect();
            out.insert(id, records);
        }
        serde_json::to_string_pretty(&out).map_err(|e| {
            CorpusError::Parse {
                what: "alignments".into(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Parse and validate against `corpus`.
    pub fn from_json(json: &str, corpus: &Corpus) -> AlignResult<Self> {
        let parse_error = |message: String| CorpusError::Parse {
            what: "alignments".into(),
            message,
        };
        let raw: BTreeMap<String, Vec<AlignmentData>> =
            serde_json::from_str(json).map_err(|e| parse_error(e.to_string()))?;
        let mut collection = Self::new();
        for (id, records) in raw {
            let sentence = corpus.require(&id)?;
            let graph = sentence.graph();
            let mut set = AlignmentSet::new();
            for data in records {
                let kind: AlignmentKind = data.kind.parse().map_err(parse_error)?;
                let (Some(&first), Some(&last)) = (data.tokens.first(), data.tokens.last()) else {
                    return Err(parse_error(format!("{id}: record without tokens")).into());
                };
                let mut record = Alignment::new(kind, Span::new(first, last + 1));
                for name in &data.nodes {
                    record.nodes.push(graph.require_node(name)?);
                }
                for (s, r, t) in &data.edges {
                    let edge = Edge::new(graph.require_node(s)?, r.clone(), graph.require_node(t)?);
                    graph.check_edge(&edge)?;
                    record.edges.push(edge);
                }
                record.validate(sentence)?;
                set.push(record);
            }
            collection.insert(id, set);
        }
        Ok(collection)
    }

    /// Write to a JSON file.
    pub fn save(&self, path: &Path, corpus: &Corpus) -> AlignResult<()> {
        let json = self.to_json(corpus)?;
        std::fs::write(path, json).map_err(|source| CorpusError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// Read a JSON file written by [`save`](Self::save).
    pub fn load(path: &Path, corpus: &Corpus) -> AlignResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json, corpus)
    }
}

impl FromIterator<(String, AlignmentSet)> for AlignmentCollection {
    fn from_iter<I: IntoIterator<Item = (String, AlignmentSet)>>(iter: I) -> Self {
        Self {
            sets: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SemanticGraph;

    fn john_saw_mary() -> Sentence {
        let mut g = SemanticGraph::new();
        let s = g.add_node("s", "see-01").unwrap();
        let j = g.add_node("j", "John").unwrap();
        let m = g.add_node("m", "Mary").unwrap();
        g.add_edge(s, ":ARG0", j).unwrap();
        g.add_edge(s, ":ARG1", m).unwrap();
        g.set_root(s).unwrap();
        Sentence::new("s1", vec!["John".into(), "saw".into(), "Mary".into()], g)
    }

    #[test]
    fn kind_tags() {
        for tag in ["subgraph", "relation", "dupl-subgraph", "reentrancy:adjunct-control"] {
            let kind: AlignmentKind = tag.parse().unwrap();
            assert_eq!(kind.to_string(), tag);
        }
        assert!("reentrancy:bogus".parse::<AlignmentKind>().is_err());
        assert!(!AlignmentKind::DuplicateSubgraph.is_primary());
    }

    #[test]
    fn copy_on_write_records() {
        let record = Alignment::new(AlignmentKind::Subgraph, Span::single(0));
        let grown = record.with_node(NodeId(1));
        assert!(record.is_empty());
        assert_eq!(grown.nodes, vec![NodeId(1)]);
        assert_eq!(grown.with_node(NodeId(1)).nodes.len(), 1);
    }

    #[test]
    fn ownership_lookups() {
        let sentence = john_saw_mary();
        let mut set = AlignmentSet::empty_per_span(&sentence, AlignmentKind::Subgraph);
        set.replace(0, set.get(0).unwrap().with_node(NodeId(1)));
        set.push(Alignment::new(AlignmentKind::DuplicateSubgraph, Span::single(2)).with_node(NodeId(2)));
        assert_eq!(set.node_owners(NodeId(1)), vec![0]);
        assert!(set.node_owner(NodeId(2)).is_none());
        assert!(set.is_node_aligned(NodeId(2)));
        assert!(set.validate(&sentence).is_ok());
    }

    #[test]
    fn double_primary_ownership_is_invalid() {
        let sentence = john_saw_mary();
        let mut set = AlignmentSet::empty_per_span(&sentence, AlignmentKind::Subgraph);
        set.replace(0, set.get(0).unwrap().with_node(NodeId(0)));
        set.replace(1, set.get(1).unwrap().with_node(NodeId(0)));
        assert!(set.validate(&sentence).is_err());
    }

    #[test]
    fn empty_duplicates_are_dropped() {
        let mut set = AlignmentSet::new();
        set.push(Alignment::new(AlignmentKind::Subgraph, Span::single(0)));
        set.push(Alignment::new(AlignmentKind::DuplicateSubgraph, Span::single(1)));
        set.remove_empty_duplicates();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn json_uses_node_names() {
        let sentence = john_saw_mary();
        let mut corpus = Corpus::new();
        corpus.push(sentence.clone()).unwrap();
        let mut set = AlignmentSet::new();
        set.push(
            Alignment::new(AlignmentKind::Relation, Span::single(1))
                .with_edge(&sentence.graph().edges()[0]),
        );
        let collection: AlignmentCollection = [("s1".to_string(), set)].into_iter().collect();
        let json = collection.to_json(&corpus).unwrap();
        assert!(json.contains("\":ARG0\""));
        assert!(json.contains("\"relation\""));
        let back = AlignmentCollection::from_json(&json, &corpus).unwrap();
        assert_eq!(back, collection);
    }

    #[test]
    fn foreign_names_are_rejected() {
        let mut corpus = Corpus::new();
        corpus.push(john_saw_mary()).unwrap();
        let json = r#"{"s1": [{"type": "subgraph", "tokens": [0], "nodes": ["zz"]}]}"#;
        assert!(AlignmentCollection::from_json(json, &corpus).is_err());
    }
}
