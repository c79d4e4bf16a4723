//! Pluggable structural rules.
//!
//! Some graph patterns are always one semantic unit regardless of what the
//! counts say (a `name` node and its `:opN` strings, a date and its parts).
//! [`CompletionRules`] grows a candidate fragment with such nodes before its
//! connectivity is checked. Rule sets are language- or domain-specific; the
//! aligner only sees the trait.

mod core;
mod english;

pub use self::core::CoreRules;
pub use self::english::EnglishRules;

use crate::alignment::AlignmentSet;
use crate::graph::{Edge, NodeId};
use crate::labels::{is_argument_marking, normalize_edge};
use crate::sentence::Sentence;

/// A set of structural completion rules.
pub trait CompletionRules: Send + Sync {
    fn name(&self) -> &'static str;

    /// Grow `nodes`, the candidate fragment for span `span`, in place.
    ///
    /// `taken` reports whether a node is already owned by a record other than
    /// the one being extended.
    fn complete(
        &self,
        sentence: &Sentence,
        span: usize,
        nodes: &mut Vec<NodeId>,
        taken: &dyn Fn(NodeId) -> bool,
    );

    /// `(span, node)` pairs certain enough to align before scoring starts.
    fn exact_matches(&self, _sentence: &Sentence) -> Vec<(usize, NodeId)> {
        Vec::new()
    }
}

/// Rules applied in order, each seeing the previous one's additions.
pub struct RuleSet {
    rules: Vec<Box<dyn CompletionRules>>,
}

impl RuleSet {
    /// Core rules, plus English rules when `english` is set.
    pub fn new(english: bool) -> Self {
        let mut rules: Vec<Box<dyn CompletionRules>> = vec![Box::new(CoreRules)];
        if english {
            rules.push(Box::new(EnglishRules));
        }
        Self { rules }
    }

    /// Add a custom rule set after the built-in ones.
    pub fn with(mut self, rules: impl CompletionRules + 'static) -> Self {
        self.rules.push(Box::new(rules));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule until none adds a node.
    pub fn complete(
        &self,
        sentence: &Sentence,
        span: usize,
        nodes: &mut Vec<NodeId>,
        taken: &dyn Fn(NodeId) -> bool,
    ) {
        loop {
            let before = nodes.len();
            for rule in &self.rules {
                rule.complete(sentence, span, nodes, taken);
            }
            if nodes.len() == before {
                break;
            }
        }
    }

    /// Exact matches from every rule, first claim per node and per span wins.
    pub fn exact_matches(&self, sentence: &Sentence) -> Vec<(usize, NodeId)> {
        let mut out: Vec<(usize, NodeId)> = Vec::new();
        for rule in &self.rules {
            for (span, node) in rule.exact_matches(sentence) {
                if !out.iter().any(|&(s, n)| s == span || n == node) {
                    out.push((span, node));
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.names()).finish()
    }
}

/// Add `node` unless already present. Returns true if it was added.
pub(crate) fn include(nodes: &mut Vec<NodeId>, node: NodeId) -> bool {
    if nodes.contains(&node) {
        false
    } else {
        nodes.push(node);
        true
    }
}

/// Span that realizes `edge` by rule alone, if any.
///
/// Argument-marking relations are realized by the span of their head (the
/// source after `-of` normalization). `:prep-X` and `:conj-X` relations are
/// realized by the unique otherwise-empty span whose label is `X`.
pub fn relation_anchor(sentence: &Sentence, subgraphs: &AlignmentSet, edge: &Edge) -> Option<usize> {
    let normalized = normalize_edge(edge);
    if is_argument_marking(&normalized.relation) {
        let owner = subgraphs.node_owner(normalized.source)?;
        return sentence.span_index(owner.span);
    }
    let word = normalized
        .relation
        .strip_prefix(":prep-")
        .or_else(|| normalized.relation.strip_prefix(":conj-"))?;
    let word = word.replace('-', " ");
    let matches: Vec<usize> = (0..sentence.span_count())
        .filter(|&i| sentence.token_label(i).eq_ignore_ascii_case(&word))
        .filter(|&i| {
            subgraphs
                .iter()
                .filter(|r| r.span == sentence.span(i))
                .all(|r| r.nodes.is_empty())
        })
        .collect();
    match matches.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{Alignment, AlignmentKind};
    use crate::graph::SemanticGraph;

    fn sentence() -> (Sentence, Vec<NodeId>) {
        let mut g = SemanticGraph::new();
        let l = g.add_node("l", "live-01").unwrap();
        let i = g.add_node("i", "i").unwrap();
        let c = g.add_node("c", "city").unwrap();
        g.add_edge(l, ":ARG0", i).unwrap();
        g.add_edge(l, ":prep-in", c).unwrap();
        g.set_root(l).unwrap();
        let tokens = "I live in town".split(' ').map(String::from).collect();
        let s = Sentence::new("r", tokens, g)
            .with_lemmas("i live in town".split(' ').map(String::from).collect())
            .unwrap();
        (s, vec![l, i, c])
    }

    #[test]
    fn argument_relations_anchor_at_head() {
        let (s, n) = sentence();
        let mut subgraphs = AlignmentSet::empty_per_span(&s, AlignmentKind::Subgraph);
        subgraphs.replace(1, Alignment::new(AlignmentKind::Subgraph, s.span(1)).with_node(n[0]));
        let edge = s.graph().edges()[0].clone();
        assert_eq!(relation_anchor(&s, &subgraphs, &edge), Some(1));
    }

    #[test]
    fn prepositions_anchor_on_their_word() {
        let (s, _) = sentence();
        let subgraphs = AlignmentSet::empty_per_span(&s, AlignmentKind::Subgraph);
        let edge = s.graph().edges()[1].clone();
        assert_eq!(relation_anchor(&s, &subgraphs, &edge), Some(2));
    }

    #[test]
    fn unaligned_heads_have_no_anchor() {
        let (s, _) = sentence();
        let subgraphs = AlignmentSet::empty_per_span(&s, AlignmentKind::Subgraph);
        let edge = s.graph().edges()[0].clone();
        assert_eq!(relation_anchor(&s, &subgraphs, &edge), None);
    }

    #[test]
    fn rule_set_composition() {
        assert_eq!(RuleSet::new(false).names(), vec!["core"]);
        assert_eq!(RuleSet::new(true).names(), vec!["core", "english"]);
    }
}
