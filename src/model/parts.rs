//! Sentence-level co-occurrence of token labels with fragment parts.
//!
//! Counts how many sentences contain both a token label and a concept, an
//! internal edge, or a relation. These counts need no alignment at all, which
//! makes them the last resort in the backoff chain.

use std::collections::{HashMap, HashSet};

use crate::corpus::Corpus;
use crate::graph::{Edge, NodeId, SemanticGraph};
use crate::labels::{EdgeLabel, SubgraphParts, normalize_relation};

use super::{ModelResult, checked, smoothed_logp};

type Counts<K> = HashMap<String, HashMap<K, f64>>;

/// Per-part co-occurrence counts.
#[derive(Debug, Clone, PartialEq)]
pub struct PartsModel {
    alpha: f64,
    /// Sentences containing each token label.
    sentences: HashMap<String, f64>,
    concepts: Counts<String>,
    edges: Counts<EdgeLabel>,
    relations: Counts<String>,
}

fn bump<K: Eq + std::hash::Hash>(counts: &mut Counts<K>, token: &str, key: K) {
    *counts
        .entry(token.to_string())
        .or_default()
        .entry(key)
        .or_insert(0.0) += 1.0;
}

fn lookup<K: Eq + std::hash::Hash>(counts: &Counts<K>, token: &str, key: &K) -> (f64, usize) {
    counts.get(token).map_or((0.0, 0), |m| {
        (m.get(key).copied().unwrap_or(0.0), m.len())
    })
}

impl PartsModel {
    /// Count co-occurrences over every sentence of the corpus.
    pub fn from_corpus(corpus: &Corpus, alpha: f64) -> Self {
        let mut model = Self {
            alpha,
            sentences: HashMap::new(),
            concepts: HashMap::new(),
            edges: HashMap::new(),
            relations: HashMap::new(),
        };
        for sentence in corpus.sentences() {
            let graph = sentence.graph();
            let concepts: HashSet<&str> = graph.nodes().map(|n| graph.concept(n)).collect();
            let edges: HashSet<EdgeLabel> =
                graph.edges().iter().map(|e| EdgeLabel::of(graph, e)).collect();
            let relations: HashSet<&str> = graph
                .edges()
                .iter()
                .map(|e| normalize_relation(&e.relation))
                .collect();
            let tokens: HashSet<String> = (0..sentence.span_count())
                .map(|i| sentence.token_label(i))
                .collect();
            for token in &tokens {
                *model.sentences.entry(token.clone()).or_insert(0.0) += 1.0;
                for &c in &concepts {
                    bump(&mut model.concepts, token, c.to_string());
                }
                for e in &edges {
                    bump(&mut model.edges, token, e.clone());
                }
                for &r in &relations {
                    bump(&mut model.relations, token, r.to_string());
                }
            }
        }
        model
    }

    /// log P(concept | token).
    pub fn concept_logp(&self, token: &str, concept: &str) -> ModelResult<f64> {
        let (count, vocabulary) = lookup(&self.concepts, token, &concept.to_string());
        let total = self.sentences.get(token).copied().unwrap_or(0.0);
        checked(smoothed_logp(count, total, vocabulary, self.alpha), || {
            format!("concept part {token:?} -> {concept}")
        })
    }

    /// log P(edge | token, source concept).
    pub fn edge_logp(&self, token: &str, edge: &EdgeLabel) -> ModelResult<f64> {
        let (count, vocabulary) = lookup(&self.edges, token, edge);
        let (source_count, _) = lookup(&self.concepts, token, &edge.source);
        checked(
            smoothed_logp(count, source_count, vocabulary, self.alpha),
            || format!("edge part {token:?} -> {edge}"),
        )
    }

    /// log P(relation | token), on the normalized relation.
    pub fn relation_logp(&self, token: &str, relation: &str) -> ModelResult<f64> {
        let relation = normalize_relation(relation).to_string();
        let (count, vocabulary) = lookup(&self.relations, token, &relation);
        let total = self.sentences.get(token).copied().unwrap_or(0.0);
        checked(smoothed_logp(count, total, vocabulary, self.alpha), || {
            format!("relation part {token:?} -> {relation}")
        })
    }

    /// Sum of part log-probabilities for a node fragment: one term per local
    /// root concept and one per internal edge.
    pub fn subgraph_logp(
        &self,
        graph: &SemanticGraph,
        token: &str,
        nodes: &[NodeId],
    ) -> ModelResult<f64> {
        let parts = SubgraphParts::of(graph, nodes);
        let mut logp = 0.0;
        for concept in &parts.roots {
            logp += self.concept_logp(token, concept)?;
        }
        for edge in &parts.edges {
            logp += self.edge_logp(token, edge)?;
        }
        Ok(logp)
    }

    /// Sum of relation part log-probabilities for an edge set.
    pub fn edges_logp(&self, token: &str, edges: &[Edge]) -> ModelResult<f64> {
        edges
            .iter()
            .map(|e| self.relation_logp(token, &e.relation))
            .sum()
    }
}
