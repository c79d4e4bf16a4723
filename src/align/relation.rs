//! Edge-to-span alignment.
//!
//! Runs on top of finished subgraph alignments. Items are the edges that are
//! not internal to a node fragment; a relation is realized at or between the
//! spans of its endpoints.

use std::collections::BTreeSet;

use crate::alignment::{Alignment, AlignmentCollection, AlignmentKind, AlignmentSet};
use crate::config::AlignConfig;
use crate::corpus::Corpus;
use crate::error::{AlignResult, CorpusError};
use crate::graph::Edge;
use crate::labels::RelationLabel;
use crate::model::{DistanceModel, ModelResult, NullModel, PartsModel, TranslationTable};
use crate::rules::relation_anchor;
use crate::sentence::Sentence;

use super::{AlignmentTask, Attachment, fragment_at, owner_span};

static EMPTY_SET: AlignmentSet = AlignmentSet::new();

/// Parent and child offset models start here: a relation word usually
/// follows its head and precedes its argument.
const PARENT_MEAN: f64 = 1.0;
const CHILD_MEAN: f64 = -1.0;
const INITIAL_STDEV: f64 = 2.0;

/// Scoring model for relation records.
#[derive(Debug, Clone)]
pub struct RelationModel {
    translations: TranslationTable<RelationLabel>,
    parts: PartsModel,
    null: NullModel,
    parent: DistanceModel,
    child: DistanceModel,
    partial_credit: f64,
}

impl RelationModel {
    pub fn new(config: &AlignConfig, corpus: &Corpus) -> Self {
        Self {
            translations: TranslationTable::new(config.alpha),
            parts: PartsModel::from_corpus(corpus, config.alpha),
            null: NullModel::from_corpus(corpus, config.null_floor),
            parent: DistanceModel::new(config.distance, PARENT_MEAN, INITIAL_STDEV),
            child: DistanceModel::new(config.distance, CHILD_MEAN, INITIAL_STDEV),
            partial_credit: config.partial_credit.ln(),
        }
    }

    /// Rebuild from relation records, reading node positions from
    /// `subgraphs`.
    pub fn estimate(
        config: &AlignConfig,
        corpus: &Corpus,
        subgraphs: &AlignmentCollection,
        relations: &AlignmentCollection,
    ) -> Self {
        let mut model = Self::new(config, corpus);
        let mut parent_offsets = Vec::new();
        let mut child_offsets = Vec::new();
        for sentence in corpus.sentences() {
            let Some(set) = relations.get(sentence.id()) else {
                continue;
            };
            let nodes = subgraphs.get(sentence.id()).unwrap_or(&EMPTY_SET);
            for record in set.iter().filter(|r| r.kind == AlignmentKind::Relation) {
                let Some(span) = sentence.span_index(record.span) else {
                    continue;
                };
                let fragment = fragment_at(sentence, nodes, span);
                model.translations.observe(
                    &sentence.token_label(span),
                    RelationLabel::of(fragment, &record.edges),
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
            "relation model estimated"
        );
        model
    }

    pub fn translations(&self) -> &TranslationTable<RelationLabel> {
        &self.translations
    }

    /// log P(relations | span). Spans with neither nodes nor relations go to
    /// the null model; unseen labels back off to per-relation parts.
    pub fn trans_logp(
        &self,
        sentence: &Sentence,
        subgraphs: &AlignmentSet,
        span: usize,
        edges: &[Edge],
    ) -> ModelResult<f64> {
        let fragment = fragment_at(sentence, subgraphs, span);
        let label = RelationLabel::of(fragment, edges);
        if label == RelationLabel::Null {
            return Ok(self.null.logp(sentence, span));
        }
        let token = sentence.token_label(span);
        if let Some(logp) = self.translations.logp(&token, &label)? {
            return Ok(logp);
        }
        Ok(self.parts.edges_logp(&token, edges)? + self.partial_credit)
    }

    /// Nearest head offset and mean argument offset, averaged when both
    /// exist. Records whose relations are all internal score the prior.
    pub fn distance_logp(&self, sentence: &Sentence, subgraphs: &AlignmentSet, span: usize, edges: &[Edge]) -> f64 {
        let default = (self.parent.default_logp() + self.child.default_logp()) / 2.0;
        let fragment = fragment_at(sentence, subgraphs, span);
        let external = edges
            .iter()
            .any(|e| !fragment.contains(&e.source) || !fragment.contains(&e.target));
        if !external {
            return default;
        }
        let graph = sentence.graph();
        let mut parent: Option<i32> = None;
        let mut children: Vec<i32> = Vec::new();
        for edge in edges {
            if let Some(s) = owner_span(sentence, subgraphs, edge.source) {
                let d = sentence.span_distance(s, span);
                if d != 0 {
                    parent = Some(parent.map_or(d, |p| p.min(d)));
                }
            }
            let Some(t) = owner_span(sentence, subgraphs, edge.target) else {
                continue;
            };
            let d = sentence.span_distance(t, span);
            if d == 0 {
                continue;
            }
            let closer_parent = graph.parents(edge.target).into_iter().any(|other| {
                other != edge.source
                    && owner_span(sentence, subgraphs, other)
                        .is_some_and(|o| sentence.span_distance(t, o).abs() <= d.abs())
            });
            if !closer_parent {
                children.push(d);
            }
        }
        let parent = parent.map(|d| self.parent.logp(d));
        let child = (!children.is_empty()).then(|| {
            let mean = children.iter().sum::<i32>() as f64 / children.len() as f64;
            self.child.logp(mean.round() as i32)
        });
        match (parent, child) {
            (Some(p), Some(c)) => (p + c) / 2.0,
            (Some(p), None) => p,
            (None, Some(c)) => c,
            (None, None) => default,
        }
    }

    pub fn logp(&self, sentence: &Sentence, subgraphs: &AlignmentSet, span: usize, edges: &[Edge]) -> ModelResult<f64> {
        Ok(self.trans_logp(sentence, subgraphs, span, edges)?
            + self.distance_logp(sentence, subgraphs, span, edges))
    }
}

/// The edge-to-span task.
#[derive(Debug)]
pub struct RelationAligner {
    config: AlignConfig,
    subgraphs: AlignmentCollection,
    model: RelationModel,
}

impl RelationAligner {
    pub fn new(config: AlignConfig, corpus: &Corpus, subgraphs: AlignmentCollection) -> Self {
        let model = RelationModel::new(&config, corpus);
        Self {
            config,
            subgraphs,
            model,
        }
    }

    pub fn model(&self) -> &RelationModel {
        &self.model
    }

    pub fn subgraphs(&self) -> &AlignmentCollection {
        &self.subgraphs
    }

    fn subgraphs_for(&self, sentence: &Sentence) -> &AlignmentSet {
        self.subgraphs.get(sentence.id()).unwrap_or(&EMPTY_SET)
    }

    /// Spans of the edge's aligned endpoints, ascending and deduplicated.
    fn endpoint_spans(&self, sentence: &Sentence, edge: &Edge) -> Vec<usize> {
        let subgraphs = self.subgraphs_for(sentence);
        let mut spans: Vec<usize> = [edge.source, edge.target]
            .into_iter()
            .filter_map(|n| owner_span(sentence, subgraphs, n))
            .collect();
        spans.sort_unstable();
        spans.dedup();
        spans
    }
}

impl AlignmentTask for RelationAligner {
    type Item = Edge;
    type Label = RelationLabel;

    fn name(&self) -> &'static str {
        "relations"
    }

    /// Edges not internal to one node fragment.
    fn items(&self, sentence: &Sentence) -> BTreeSet<Edge> {
        let subgraphs = self.subgraphs_for(sentence);
        sentence
            .graph()
            .edges()
            .iter()
            .filter(|e| match subgraphs.node_owner(e.source) {
                Some(record) => !record.owns_node(e.target),
                None => true,
            })
            .cloned()
            .collect()
    }

    fn is_aligned(&self, set: &AlignmentSet, item: &Edge) -> bool {
        set.is_edge_aligned(item)
    }

    /// One empty record per span, then rule anchors.
    fn initial_alignments(&self, sentence: &Sentence) -> AlignResult<AlignmentSet> {
        let subgraphs = self
            .subgraphs
            .get(sentence.id())
            .ok_or_else(|| CorpusError::MissingAlignments {
                sentence: sentence.id().to_string(),
                task: "subgraphs".into(),
            })?;
        let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Relation);
        for edge in self.items(sentence) {
            let Some(span) = relation_anchor(sentence, subgraphs, &edge) else {
                continue;
            };
            if sentence.is_punctuation(span) {
                continue;
            }
            let record = set.records()[span].with_edge(&edge);
            set.replace(span, record);
        }
        Ok(set)
    }

    fn label_of(&self, sentence: &Sentence, record: &Alignment) -> RelationLabel {
        let fragment = sentence
            .span_index(record.span)
            .map_or(&[][..], |span| fragment_at(sentence, self.subgraphs_for(sentence), span));
        RelationLabel::of(fragment, &record.edges)
    }

    /// Every span from the leftmost to the rightmost aligned endpoint.
    fn candidates_for(
        &self,
        sentence: &Sentence,
        _set: &AlignmentSet,
        item: &Edge,
        _unaligned: &BTreeSet<Edge>,
    ) -> Vec<usize> {
        match self.endpoint_spans(sentence, item).as_slice() {
            [] => Vec::new(),
            [only] => vec![*only],
            [first, .., last] => (*first..=*last).collect(),
        }
    }

    /// Endpoint spans always qualify; spans in between only if they realize
    /// no node. Punctuation never realizes a relation.
    fn is_legal_attachment(&self, sentence: &Sentence, _set: &AlignmentSet, item: &Edge, span: usize) -> bool {
        if sentence.is_punctuation(span) {
            return false;
        }
        self.endpoint_spans(sentence, item).contains(&span)
            || fragment_at(sentence, self.subgraphs_for(sentence), span).is_empty()
    }

    fn attach(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        item: &Edge,
        span: usize,
    ) -> AlignResult<Option<Attachment>> {
        let index = set.find(AlignmentKind::Relation, sentence.span(span));
        let current = index
            .and_then(|i| set.get(i))
            .cloned()
            .unwrap_or_else(|| Alignment::new(AlignmentKind::Relation, sentence.span(span)));
        Ok(Some(Attachment {
            record: current.with_edge(item),
            replaces: index,
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
        Ok(self
            .model
            .logp(sentence, self.subgraphs_for(sentence), span, &record.edges)?)
    }

    fn update_parameters(&mut self, corpus: &Corpus, alignments: &AlignmentCollection) -> AlignResult<()> {
        self.model = RelationModel::estimate(&self.config, corpus, &self.subgraphs, alignments);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_sentence;
    use crate::graph::SemanticGraph;

    /// "John lives in Paris" with live-01(:ARG0 John, :location Paris).
    fn corpus() -> (Corpus, AlignmentCollection) {
        let mut g = SemanticGraph::new();
        let l = g.add_node("l", "live-01").unwrap();
        let j = g.add_node("j", "John").unwrap();
        let p = g.add_node("p", "Paris").unwrap();
        g.add_edge(l, ":ARG0", j).unwrap();
        g.add_edge(l, ":location", p).unwrap();
        g.set_root(l).unwrap();
        let tokens = "John lives in Paris".split(' ').map(String::from).collect();
        let sentence = Sentence::new("r1", tokens, g)
            .with_lemmas("john live in paris".split(' ').map(String::from).collect())
            .unwrap();
        let mut set = AlignmentSet::empty_per_span(&sentence, AlignmentKind::Subgraph);
        for (span, node) in [(0, j), (1, l), (3, p)] {
            let record = set.records()[span].with_node(node);
            set.replace(span, record);
        }
        let mut corpus = Corpus::new();
        corpus.push(sentence).unwrap();
        (corpus, [("r1".to_string(), set)].into_iter().collect())
    }

    #[test]
    fn argument_relations_are_seeded_at_their_head() {
        let (corpus, subgraphs) = corpus();
        let aligner = RelationAligner::new(AlignConfig::default(), &corpus, subgraphs);
        let sentence = &corpus.sentences()[0];
        let set = aligner.initial_alignments(sentence).unwrap();
        let arg0 = &sentence.graph().edges()[0];
        assert!(set.records()[1].owns_edge(arg0));
        assert!(!set.is_edge_aligned(&sentence.graph().edges()[1]));
    }

    #[test]
    fn candidates_lie_between_endpoints() {
        let (corpus, subgraphs) = corpus();
        let aligner = RelationAligner::new(AlignConfig::default(), &corpus, subgraphs);
        let sentence = &corpus.sentences()[0];
        let set = aligner.initial_alignments(sentence).unwrap();
        let location = sentence.graph().edges()[1].clone();
        let unaligned = aligner.unaligned(sentence, &set, crate::align::Pass::Primary);
        assert_eq!(unaligned, BTreeSet::from([location.clone()]));
        assert_eq!(aligner.candidates_for(sentence, &set, &location, &unaligned), vec![1, 2, 3]);
        assert!(aligner.is_legal_attachment(sentence, &set, &location, 2));
        let arg0 = sentence.graph().edges()[0].clone();
        assert!(!aligner.is_legal_attachment(sentence, &set, &arg0, 3));
    }

    #[test]
    fn every_relation_ends_up_aligned() {
        let (corpus, subgraphs) = corpus();
        let aligner = RelationAligner::new(AlignConfig::default(), &corpus, subgraphs);
        let sentence = &corpus.sentences()[0];
        let set = align_sentence(&aligner, sentence).unwrap();
        for edge in sentence.graph().edges() {
            assert!(set.is_edge_aligned(edge), "{edge:?}");
        }
        set.validate(sentence).unwrap();
    }

    #[test]
    fn missing_subgraphs_are_an_error() {
        let (corpus, _) = corpus();
        let aligner = RelationAligner::new(AlignConfig::default(), &corpus, AlignmentCollection::new());
        assert!(aligner.initial_alignments(&corpus.sentences()[0]).is_err());
    }

    #[test]
    fn labels_use_the_span_fragment() {
        let (corpus, subgraphs) = corpus();
        let aligner = RelationAligner::new(AlignConfig::default(), &corpus, subgraphs);
        let sentence = &corpus.sentences()[0];
        let set = aligner.initial_alignments(sentence).unwrap();
        assert_eq!(aligner.label_of(sentence, &set.records()[1]).to_string(), "n0_:ARG0_v");
        assert_eq!(aligner.label_of(sentence, &set.records()[0]), RelationLabel::NoArgs);
        assert_eq!(aligner.label_of(sentence, &set.records()[2]), RelationLabel::Null);
    }
}
