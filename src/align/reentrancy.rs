//! Reentrant-edge disambiguation.
//!
//! A node with several parents is realized once, through its primary edge.
//! Every other edge into it needs a span that explains the sharing: a
//! coordinator, a control verb, a pronoun, a repeated word. Candidate spans
//! are typed by the construction that licenses them, and an edge that no
//! construction explains falls back to the pragmatic reading at its relation
//! span, at a fixed penalty.

use std::collections::BTreeSet;

use crate::alignment::{Alignment, AlignmentCollection, AlignmentKind, AlignmentSet, ReentrancyKind};
use crate::config::AlignConfig;
use crate::corpus::Corpus;
use crate::error::{AlignResult, CorpusError};
use crate::graph::Edge;
use crate::labels::ReentrancyLabel;
use crate::model::{DistanceModel, MIN_PROBABILITY, ModelResult, TranslationTable};
use crate::sentence::Sentence;

use super::{AlignmentTask, Attachment, fragment_at, owner_span};

static EMPTY_SET: AlignmentSet = AlignmentSet::new();

const INITIAL_MEAN: f64 = 0.0;
const INITIAL_STDEV: f64 = 10.0;

const CONTENT_TAGS: [&str; 11] = [
    "VB", "VBD", "VBZ", "VBG", "VBP", "VBN", "NN", "NNS", "JJ", "JJR", "JJS",
];
const PRONOUN_TAGS: [&str; 3] = ["PRP", "PRP$", "WP"];
const COORDINATORS: [&str; 2] = ["and", "or"];

/// Lemma prefix length two spans must share to count as a repetition.
const REPETITION_PREFIX: usize = 6;

/// Scoring model for reentrancy records.
#[derive(Debug, Clone)]
pub struct ReentrancyModel {
    translations: TranslationTable<ReentrancyLabel>,
    parent: DistanceModel,
    child: DistanceModel,
    unseen: f64,
    pragmatic: f64,
}

impl ReentrancyModel {
    pub fn new(config: &AlignConfig) -> Self {
        Self {
            translations: TranslationTable::new(config.alpha),
            parent: DistanceModel::new(config.distance, INITIAL_MEAN, INITIAL_STDEV),
            child: DistanceModel::new(config.distance, INITIAL_MEAN, INITIAL_STDEV),
            unseen: MIN_PROBABILITY.ln(),
            pragmatic: config.pragmatic_rate.ln(),
        }
    }

    /// Rebuild from reentrancy records, reading node positions from
    /// `subgraphs`.
    pub fn estimate(
        config: &AlignConfig,
        corpus: &Corpus,
        subgraphs: &AlignmentCollection,
        reentrancies: &AlignmentCollection,
    ) -> Self {
        let mut model = Self::new(config);
        let mut parent_offsets = Vec::new();
        let mut child_offsets = Vec::new();
        for sentence in corpus.sentences() {
            let Some(set) = reentrancies.get(sentence.id()) else {
                continue;
            };
            let nodes = subgraphs.get(sentence.id()).unwrap_or(&EMPTY_SET);
            for record in set {
                let AlignmentKind::Reentrancy(kind) = record.kind else {
                    continue;
                };
                let Some(span) = sentence.span_index(record.span) else {
                    continue;
                };
                model.translations.observe(
                    &sentence.token_label(span),
                    ReentrancyLabel::of(kind, &record.edges),
                );
                for edge in &record.edges {
                    if let Some(s) = owner_span(sentence, nodes, edge.source) {
                        let d = sentence.span_distance(s, span);
                        if d != 0 {
                            parent_offsets.push(d);
                        }
                    }
                    if let Some(t) = owner_span(sentence, nodes, edge.target) {
                        let d = sentence.span_distance(t, span);
                        if d != 0 {
                            child_offsets.push(d);
                        }
                    }
                }
            }
        }
        let pruned = model.translations.prune(config.prune_threshold);
        model.parent.fit(&parent_offsets);
        model.child.fit(&child_offsets);
        tracing::debug!(
            pairs = model.translations.len(),
            pruned,
            parent_mean = model.parent.mean(),
            child_mean = model.child.mean(),
            "reentrancy model estimated"
        );
        model
    }

    pub fn translations(&self) -> &TranslationTable<ReentrancyLabel> {
        &self.translations
    }

    /// Log-penalty added when scoring a pragmatic attachment.
    pub fn pragmatic_penalty(&self) -> f64 {
        self.pragmatic
    }

    /// Observed (span, label) pairs are smoothed counts; anything else gets
    /// the probability floor. There is no backoff.
    pub fn trans_logp(&self, sentence: &Sentence, span: usize, label: &ReentrancyLabel) -> ModelResult<f64> {
        Ok(self
            .translations
            .logp(&sentence.token_label(span), label)?
            .unwrap_or(self.unseen))
    }

    /// Parent offset plus child offset, each from its endpoint's span to the
    /// record's span.
    pub fn distance_logp(&self, sentence: &Sentence, subgraphs: &AlignmentSet, span: usize, edges: &[Edge]) -> f64 {
        let mut parent = None;
        let mut child = None;
        for edge in edges {
            if let Some(s) = owner_span(sentence, subgraphs, edge.source) {
                parent = Some(sentence.span_distance(s, span));
            }
            if let Some(t) = owner_span(sentence, subgraphs, edge.target) {
                child = Some(sentence.span_distance(t, span));
            }
        }
        parent.map_or_else(|| self.parent.default_logp(), |d| self.parent.logp(d))
            + child.map_or_else(|| self.child.default_logp(), |d| self.child.logp(d))
    }

    pub fn logp(
        &self,
        sentence: &Sentence,
        subgraphs: &AlignmentSet,
        span: usize,
        label: &ReentrancyLabel,
        edges: &[Edge],
    ) -> ModelResult<f64> {
        Ok(self.trans_logp(sentence, span, label)? + self.distance_logp(sentence, subgraphs, span, edges))
    }
}

fn kind_of(record: &Alignment) -> ReentrancyKind {
    match record.kind {
        AlignmentKind::Reentrancy(kind) => kind,
        _ => ReentrancyKind::Primary,
    }
}

/// The reentrant-edge task.
#[derive(Debug)]
pub struct ReentrancyAligner {
    config: AlignConfig,
    subgraphs: AlignmentCollection,
    relations: AlignmentCollection,
    model: ReentrancyModel,
}

impl ReentrancyAligner {
    pub fn new(config: AlignConfig, subgraphs: AlignmentCollection, relations: AlignmentCollection) -> Self {
        let model = ReentrancyModel::new(&config);
        Self {
            config,
            subgraphs,
            relations,
            model,
        }
    }

    pub fn model(&self) -> &ReentrancyModel {
        &self.model
    }

    fn sets(&self, sentence: &Sentence) -> (&AlignmentSet, &AlignmentSet) {
        (
            self.subgraphs.get(sentence.id()).unwrap_or(&EMPTY_SET),
            self.relations.get(sentence.id()).unwrap_or(&EMPTY_SET),
        )
    }

    /// Span index of the relation record owning `edge`.
    fn relation_span(&self, sentence: &Sentence, edge: &Edge) -> Option<usize> {
        let (_, relations) = self.sets(sentence);
        relations
            .edge_owner(edge)
            .and_then(|record| sentence.span_index(record.span))
    }

    /// One primary edge per reentrant node, with the span it is anchored on.
    ///
    /// An incoming edge already realized at the node's own span wins.
    /// Otherwise the edge whose source sits nearest the node is taken, at
    /// its relation span. Nodes with no aligned candidate are skipped.
    pub fn primary_edges(&self, sentence: &Sentence) -> Vec<(usize, Edge)> {
        let graph = sentence.graph();
        let (subgraphs, relations) = self.sets(sentence);
        let mut primaries = Vec::new();
        for target in graph.reentrant_nodes() {
            let incoming = graph.incoming(target);
            let target_span = owner_span(sentence, subgraphs, target);
            let local = target_span.and_then(|t| {
                let record = relations
                    .find(AlignmentKind::Relation, sentence.span(t))
                    .and_then(|i| relations.get(i))?;
                incoming
                    .iter()
                    .find(|e| record.owns_edge(e))
                    .map(|e| (t, (*e).clone()))
            });
            if let Some(primary) = local {
                primaries.push(primary);
                continue;
            }
            let Some(t) = target_span else {
                continue;
            };
            let nearest = incoming
                .iter()
                .filter_map(|e| {
                    let span = self.relation_span(sentence, e)?;
                    let s = owner_span(sentence, subgraphs, e.source)?;
                    Some(((sentence.span_distance(s, t).abs(), s), span, *e))
                })
                .min_by_key(|(key, _, _)| *key);
            if let Some((_, span, edge)) = nearest {
                primaries.push((span, edge.clone()));
            }
        }
        primaries
    }

    /// Constructions that could explain `edge` at span `index`, most
    /// specific first. Empty if the span is not a candidate.
    pub fn span_kinds(&self, sentence: &Sentence, edge: &Edge, index: usize) -> Vec<ReentrancyKind> {
        let graph = sentence.graph();
        let (subgraphs, relations) = self.sets(sentence);
        let relation_span = self.relation_span(sentence, edge);
        let target_span = owner_span(sentence, subgraphs, edge.target);
        let pos = sentence.span_pos(index);
        let mut kinds = Vec::new();

        if Some(index) == relation_span {
            if graph.concept(edge.source) == "have-degree-91" {
                kinds.push(ReentrancyKind::Comparative);
            }
            if pos == "VBG" {
                kinds.push(ReentrancyKind::UnmarkedAdjunctControl);
            }
            kinds.push(ReentrancyKind::Pragmatic);
            return kinds;
        }

        let neighbors: Vec<&Edge> = graph
            .incoming(edge.target)
            .into_iter()
            .filter(|e| *e != edge)
            .collect();
        if fragment_at(sentence, subgraphs, index).is_empty() {
            if PRONOUN_TAGS.contains(&pos) && is_coreferent(sentence, index, target_span) {
                kinds.push(ReentrancyKind::Coref);
            }
            if is_repetition(sentence, index, target_span) {
                kinds.push(ReentrancyKind::Repetition);
            }
        } else {
            let grandparents = graph.parents(edge.source);
            let coordinated = neighbors.iter().any(|other| {
                let theirs = graph.parents(other.source);
                grandparents.iter().any(|&c| {
                    COORDINATORS.contains(&graph.concept(c))
                        && theirs.contains(&c)
                        && owner_span(sentence, subgraphs, c) == Some(index)
                })
            });
            if coordinated {
                kinds.push(ReentrancyKind::Coordination);
            }
            if self.is_control(sentence, subgraphs, relations, edge, &neighbors, index) {
                kinds.push(ReentrancyKind::Control);
            }
        }

        let next = (index + 1 < sentence.span_count()).then_some(index + 1);
        let next_pos = next.map(|n| sentence.span_pos(n));
        let marked = (pos == "IN" && next_pos == Some("VBG"))
            || (sentence.token_label(index).to_lowercase() == "to"
                && next_pos == Some("VB")
                && edge.relation == ":purpose");
        if marked && next.is_some() && next == relation_span {
            kinds.push(ReentrancyKind::AdjunctControl);
        }
        kinds
    }

    /// A content word before the controlled head, realizing a sibling edge
    /// together with the relation from its own node to the controlled head.
    fn is_control(
        &self,
        sentence: &Sentence,
        subgraphs: &AlignmentSet,
        relations: &AlignmentSet,
        edge: &Edge,
        neighbors: &[&Edge],
        index: usize,
    ) -> bool {
        let Some(source_span) = owner_span(sentence, subgraphs, edge.source) else {
            return false;
        };
        if !CONTENT_TAGS.contains(&sentence.span_pos(index))
            || !CONTENT_TAGS.contains(&sentence.span_pos(source_span))
            || index >= source_span
        {
            return false;
        }
        let Some(controlled) = subgraphs.node_owner(edge.source) else {
            return false;
        };
        neighbors.iter().any(|other| {
            let Some(record) = relations.edge_owner(other) else {
                return false;
            };
            let Some(controller) = subgraphs.node_owner(other.source) else {
                return false;
            };
            sentence.span_index(record.span) == Some(index)
                && record
                    .edges
                    .iter()
                    .any(|e| controller.owns_node(e.source) && controlled.owns_node(e.target))
        })
    }
}

/// A pronoun in no coreference chain, or in a chain with the target's span.
fn is_coreferent(sentence: &Sentence, index: usize, target_span: Option<usize>) -> bool {
    let mention = sentence.span(index);
    let mut chains = sentence
        .coref()
        .iter()
        .filter(|chain| chain.contains(&mention))
        .peekable();
    if chains.peek().is_none() {
        return true;
    }
    let Some(t) = target_span else {
        return false;
    };
    let target = sentence.span(t);
    chains.any(|chain| chain.contains(&target))
}

/// The span repeats the target's word, judged by a shared lemma prefix.
fn is_repetition(sentence: &Sentence, index: usize, target_span: Option<usize>) -> bool {
    let Some(t) = target_span else {
        return false;
    };
    let prefix = |i: usize| -> String {
        sentence
            .token_label(i)
            .to_lowercase()
            .chars()
            .take(REPETITION_PREFIX)
            .collect()
    };
    t != index && prefix(t) == prefix(index)
}

impl AlignmentTask for ReentrancyAligner {
    type Item = Edge;
    type Label = ReentrancyLabel;

    fn name(&self) -> &'static str {
        "reentrancies"
    }

    /// Every edge into a node with more than one parent.
    fn items(&self, sentence: &Sentence) -> BTreeSet<Edge> {
        sentence
            .graph()
            .reentrant_edges()
            .into_iter()
            .cloned()
            .collect()
    }

    fn is_aligned(&self, set: &AlignmentSet, item: &Edge) -> bool {
        set.is_edge_aligned(item)
    }

    /// Primary edges, one record each.
    fn initial_alignments(&self, sentence: &Sentence) -> AlignResult<AlignmentSet> {
        for (collection, task) in [(&self.subgraphs, "subgraphs"), (&self.relations, "relations")] {
            if collection.get(sentence.id()).is_none() {
                return Err(CorpusError::MissingAlignments {
                    sentence: sentence.id().to_string(),
                    task: task.into(),
                }
                .into());
            }
        }
        let mut set = AlignmentSet::new();
        for (span, edge) in self.primary_edges(sentence) {
            set.push(
                Alignment::new(AlignmentKind::Reentrancy(ReentrancyKind::Primary), sentence.span(span))
                    .with_edge(&edge),
            );
        }
        Ok(set)
    }

    fn label_of(&self, _sentence: &Sentence, record: &Alignment) -> ReentrancyLabel {
        ReentrancyLabel::of(kind_of(record), &record.edges)
    }

    fn candidates_for(
        &self,
        sentence: &Sentence,
        _set: &AlignmentSet,
        item: &Edge,
        _unaligned: &BTreeSet<Edge>,
    ) -> Vec<usize> {
        (0..sentence.span_count())
            .filter(|&i| !self.span_kinds(sentence, item, i).is_empty())
            .collect()
    }

    /// A new single-edge record typed by the span's most specific
    /// construction.
    fn attach(
        &self,
        sentence: &Sentence,
        _set: &AlignmentSet,
        item: &Edge,
        span: usize,
    ) -> AlignResult<Option<Attachment>> {
        Ok(self.span_kinds(sentence, item, span).first().map(|&kind| Attachment {
            record: Alignment::new(AlignmentKind::Reentrancy(kind), sentence.span(span)).with_edge(item),
            replaces: None,
        }))
    }

    fn logp(&self, sentence: &Sentence, _set: &AlignmentSet, record: &Alignment) -> AlignResult<f64> {
        let span = sentence
            .span_index(record.span)
            .ok_or_else(|| CorpusError::InvalidSpan {
                sentence: sentence.id().to_string(),
                start: record.span.start,
                end: record.span.end,
            })?;
        let (subgraphs, _) = self.sets(sentence);
        let label = self.label_of(sentence, record);
        Ok(self
            .model
            .logp(sentence, subgraphs, span, &label, &record.edges)?)
    }

    fn score(&self, sentence: &Sentence, set: &AlignmentSet, attachment: &Attachment) -> AlignResult<f64> {
        let logp = self.logp(sentence, set, &attachment.record)?;
        Ok(match kind_of(&attachment.record) {
            ReentrancyKind::Pragmatic => logp + self.model.pragmatic_penalty(),
            _ => logp,
        })
    }

    fn update_parameters(&mut self, corpus: &Corpus, alignments: &AlignmentCollection) -> AlignResult<()> {
        self.model = ReentrancyModel::estimate(&self.config, corpus, &self.subgraphs, alignments);
        Ok(())
    }
}
