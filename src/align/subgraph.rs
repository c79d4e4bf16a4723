//! Node-to-span alignment.
//!
//! Items are graph nodes. A node can start a fragment on a span with no nodes
//! yet, or join the fragment of a span that already owns one of its graph
//! neighbors. Every proposal runs through the completion rules and connectivity
//! repair before it is scored.

use std::collections::BTreeSet;

use crate::alignment::{Alignment, AlignmentCollection, AlignmentKind, AlignmentSet};
use crate::config::AlignConfig;
use crate::corpus::Corpus;
use crate::error::{AlignResult, CorpusError};
use crate::graph::traverse::is_leaf_sibling_pair;
use crate::graph::{NodeId, SemanticGraph};
use crate::labels::SubgraphLabel;
use crate::model::{DistanceModel, ModelResult, NullModel, PartsModel, TranslationTable};
use crate::rules::RuleSet;
use crate::sentence::Sentence;

use super::repair::repair;
use super::{AlignmentTask, Attachment, Pass, duplicates, owner_span};

/// Standard deviation of the offset model before any alignments exist.
const INITIAL_STDEV: f64 = 10.0;

/// Scoring model for node fragments.
#[derive(Debug, Clone)]
pub struct SubgraphModel {
    translations: TranslationTable<SubgraphLabel>,
    parts: PartsModel,
    null: NullModel,
    distance: DistanceModel,
    /// Log of the backoff discount.
    partial_credit: f64,
}

impl SubgraphModel {
    /// Model with no translation counts; only the corpus-level parts and
    /// null statistics are available.
    pub fn new(config: &AlignConfig, corpus: &Corpus) -> Self {
        Self {
            translations: TranslationTable::new(config.alpha),
            parts: PartsModel::from_corpus(corpus, config.alpha),
            null: NullModel::from_corpus(corpus, config.null_floor),
            distance: DistanceModel::new(config.distance, 0.0, INITIAL_STDEV),
            partial_credit: config.partial_credit.ln(),
        }
    }

    /// Rebuild every table from a completed collection.
    pub fn estimate(config: &AlignConfig, corpus: &Corpus, alignments: &AlignmentCollection) -> Self {
        let mut model = Self::new(config, corpus);
        let mut offsets = Vec::new();
        for sentence in corpus.sentences() {
            let Some(set) = alignments.get(sentence.id()) else {
                continue;
            };
            let graph = sentence.graph();
            for record in set.iter().filter(|r| r.kind == AlignmentKind::Subgraph) {
                let Some(span) = sentence.span_index(record.span) else {
                    continue;
                };
                model
                    .translations
                    .observe(&sentence.token_label(span), SubgraphLabel::of(graph, &record.nodes));
            }
            for edge in graph.edges() {
                let source = owner_span(sentence, set, edge.source);
                let target = owner_span(sentence, set, edge.target);
                if let (Some(s), Some(t)) = (source, target) {
                    offsets.push(sentence.span_distance(s, t));
                }
            }
        }
        let pruned = model.translations.prune(config.prune_threshold);
        model.distance.fit(&offsets);
        tracing::debug!(
            pairs = model.translations.len(),
            pruned,
            offsets = offsets.len(),
            mean = model.distance.mean(),
            stdev = model.distance.stdev(),
            "subgraph model estimated"
        );
        model
    }

    pub fn translations(&self) -> &TranslationTable<SubgraphLabel> {
        &self.translations
    }

    pub fn parts(&self) -> &PartsModel {
        &self.parts
    }

    pub fn distance(&self) -> &DistanceModel {
        &self.distance
    }

    /// log P(fragment | span).
    ///
    /// Exact observed pair first, then the best single lemma of a multi-token
    /// span observed with the same fragment, then the fragment's parts. Both
    /// backoffs pay the partial-credit discount.
    pub fn trans_logp(&self, sentence: &Sentence, span: usize, nodes: &[NodeId]) -> ModelResult<f64> {
        if nodes.is_empty() {
            return Ok(self.null.logp(sentence, span));
        }
        let graph = sentence.graph();
        let token = sentence.token_label(span);
        let label = SubgraphLabel::of(graph, nodes);
        if let Some(logp) = self.translations.logp(&token, &label)? {
            return Ok(logp);
        }
        let lemmas = sentence.span_lemmas(span);
        if lemmas.len() > 1 {
            let mut best: Option<f64> = None;
            for lemma in lemmas {
                if let Some(logp) = self.translations.logp(lemma, &label)? {
                    best = Some(best.map_or(logp, |b: f64| b.max(logp)));
                }
            }
            if let Some(best) = best {
                return Ok(best + self.partial_credit);
            }
        }
        Ok(self.parts.subgraph_logp(graph, &token, nodes)? + self.partial_credit)
    }

    /// Offset to the nearest aligned parent plus offset to the farthest
    /// aligned child. A missing side scores as one standard deviation out.
    /// A child that another parent realizes at least as closely is a
    /// reentrancy and does not count.
    pub fn distance_logp(&self, sentence: &Sentence, set: &AlignmentSet, span: usize, nodes: &[NodeId]) -> f64 {
        let graph = sentence.graph();
        let mut parent: Option<i32> = None;
        let mut child: Option<i32> = None;
        for edge in graph.edges() {
            let (s, t) = (edge.source, edge.target);
            if nodes.contains(&t) && !nodes.contains(&s) {
                if let Some(from) = owner_span(sentence, set, s) {
                    let d = sentence.span_distance(from, span);
                    parent = Some(parent.map_or(d, |p| p.min(d)));
                }
            } else if nodes.contains(&s) && !nodes.contains(&t) {
                let Some(to) = owner_span(sentence, set, t) else {
                    continue;
                };
                let d = sentence.span_distance(span, to);
                let closer_parent = graph.parents(t).into_iter().any(|other| {
                    other != s
                        && owner_span(sentence, set, other)
                            .is_some_and(|o| sentence.span_distance(o, to).abs() <= d.abs())
                });
                if closer_parent {
                    continue;
                }
                child = Some(child.map_or(d, |c| c.max(d)));
            }
        }
        let side = |d: Option<i32>| d.map_or_else(|| self.distance.default_logp(), |d| self.distance.logp(d));
        side(parent) + side(child)
    }

    pub fn logp(&self, sentence: &Sentence, set: &AlignmentSet, span: usize, nodes: &[NodeId]) -> ModelResult<f64> {
        Ok(self.trans_logp(sentence, span, nodes)? + self.distance_logp(sentence, set, span, nodes))
    }
}

/// True if another node carries the same concept.
pub fn is_duplicate(graph: &SemanticGraph, node: NodeId) -> bool {
    let concept = graph.concept(node);
    graph.nodes().any(|n| n != node && graph.concept(n) == concept)
}

/// The node-to-span task.
#[derive(Debug)]
pub struct SubgraphAligner {
    config: AlignConfig,
    rules: RuleSet,
    model: SubgraphModel,
}

impl SubgraphAligner {
    pub fn new(config: AlignConfig, corpus: &Corpus) -> Self {
        let rules = RuleSet::new(config.english);
        let model = SubgraphModel::new(&config, corpus);
        Self { config, rules, model }
    }

    /// Replace the completion rules.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    pub fn model(&self) -> &SubgraphModel {
        &self.model
    }

    /// Run completion and repair on `nodes` as the fragment of the record at
    /// `index`. Returns `None` if repair had to drop any of the proposed
    /// nodes.
    fn grow(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        span: usize,
        index: Option<usize>,
        mut nodes: Vec<NodeId>,
    ) -> Option<Vec<NodeId>> {
        let taken = |n: NodeId| set.node_owners(n).into_iter().any(|i| Some(i) != index);
        let required = nodes.clone();
        self.rules.complete(sentence, span, &mut nodes, &taken);
        let outcome = repair(sentence.graph(), &mut nodes, &|n| !taken(n));
        if outcome.dropped().iter().any(|n| required.contains(n)) {
            return None;
        }
        Some(nodes)
    }

    fn record_at(&self, sentence: &Sentence, set: &AlignmentSet, span: usize) -> (Option<usize>, Alignment) {
        let index = set.find(AlignmentKind::Subgraph, sentence.span(span));
        let record = index
            .and_then(|i| set.get(i))
            .cloned()
            .unwrap_or_else(|| Alignment::new(AlignmentKind::Subgraph, sentence.span(span)));
        (index, record)
    }

    /// Move nodes owned by several primary records onto the largest owner,
    /// then re-repair the records that lost them.
    fn collapse_shared_nodes(&self, sentence: &Sentence, set: &mut AlignmentSet) {
        let graph = sentence.graph();
        for node in graph.nodes() {
            let owners = set.node_owners(node);
            if owners.len() < 2 {
                continue;
            }
            let records = set.records();
            let Some(keep) = owners.iter().copied().max_by(|&a, &b| {
                records[a]
                    .nodes
                    .len()
                    .cmp(&records[b].nodes.len())
                    .then(b.cmp(&a))
            }) else {
                continue;
            };
            for index in owners.into_iter().filter(|&i| i != keep) {
                let mut nodes = set.records()[index].nodes.clone();
                nodes.retain(|&n| n != node);
                let outcome = repair(graph, &mut nodes, &|n| set.node_owners(n).is_empty());
                if !outcome.is_lossless() {
                    tracing::debug!(
                        sentence = sentence.id(),
                        span = %set.records()[index].span,
                        dropped = outcome.dropped().len(),
                        "record lost nodes while collapsing shared ownership"
                    );
                }
                let record = set.records()[index].with_nodes(nodes);
                set.replace(index, record);
            }
        }
    }
}

impl AlignmentTask for SubgraphAligner {
    type Item = NodeId;
    type Label = SubgraphLabel;

    fn name(&self) -> &'static str {
        "subgraphs"
    }

    fn items(&self, sentence: &Sentence) -> BTreeSet<NodeId> {
        sentence.graph().nodes().collect()
    }

    fn is_aligned(&self, set: &AlignmentSet, item: &NodeId) -> bool {
        set.is_node_aligned(*item)
    }

    /// One empty record per span, then exact-match seeds.
    fn initial_alignments(&self, sentence: &Sentence) -> AlignResult<AlignmentSet> {
        let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
        for (span, node) in self.rules.exact_matches(sentence) {
            if set.is_node_aligned(node) || !set.records()[span].nodes.is_empty() {
                continue;
            }
            if let Some(nodes) = self.grow(sentence, &set, span, Some(span), vec![node]) {
                let record = set.records()[span].with_nodes(nodes);
                set.replace(span, record);
            }
        }
        Ok(set)
    }

    fn unaligned(&self, sentence: &Sentence, set: &AlignmentSet, pass: Pass) -> BTreeSet<NodeId> {
        let skip_duplicates = match pass {
            Pass::Primary => self.config.align_duplicates || self.config.ignore_duplicates,
            Pass::Final => self.config.ignore_duplicates && !self.config.align_duplicates,
        };
        let graph = sentence.graph();
        graph
            .nodes()
            .filter(|&n| !set.is_node_aligned(n))
            .filter(|&n| !(skip_duplicates && is_duplicate(graph, n)))
            .collect()
    }

    fn label_of(&self, sentence: &Sentence, record: &Alignment) -> SubgraphLabel {
        SubgraphLabel::of(sentence.graph(), &record.nodes)
    }

    /// Empty spans, spans owning a neighbor of the completed node, and spans
    /// owning exactly one leaf sibling of a leaf node.
    fn candidates_for(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        item: &NodeId,
        unaligned: &BTreeSet<NodeId>,
    ) -> Vec<usize> {
        if sentence.span_count() == 0 {
            return Vec::new();
        }
        let graph = sentence.graph();
        let mut spans: BTreeSet<usize> = (0..sentence.span_count())
            .filter(|&i| {
                set.find(AlignmentKind::Subgraph, sentence.span(i))
                    .and_then(|k| set.get(k))
                    .is_none_or(|r| r.nodes.is_empty())
            })
            .collect();

        // Completion depends on the span's words, so each span grows its own
        // fragment and only counts neighbors it already owns.
        for span in 0..sentence.span_count() {
            if spans.contains(&span) {
                continue;
            }
            let mut fragment = vec![*item];
            self.rules
                .complete(sentence, span, &mut fragment, &|n| set.node_owner(n).is_some());
            let joins = graph.edges().iter().any(|edge| {
                let neighbor = match (fragment.contains(&edge.source), fragment.contains(&edge.target)) {
                    (true, false) => edge.target,
                    (false, true) => edge.source,
                    _ => return false,
                };
                !unaligned.contains(&neighbor) && owner_span(sentence, set, neighbor) == Some(span)
            });
            if joins {
                spans.insert(span);
            }
        }

        if graph.children(*item).is_empty() {
            for other in graph.nodes() {
                if unaligned.contains(&other) || !is_leaf_sibling_pair(graph, *item, other) {
                    continue;
                }
                if let Some(record) = set.node_owner(other) {
                    if record.nodes.len() == 1 {
                        spans.extend(sentence.span_index(record.span));
                    }
                }
            }
        }
        spans.into_iter().collect()
    }

    fn attach(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        item: &NodeId,
        span: usize,
    ) -> AlignResult<Option<Attachment>> {
        let (index, current) = self.record_at(sentence, set, span);
        let mut nodes = current.nodes.clone();
        if !nodes.contains(item) {
            nodes.push(*item);
        }
        Ok(self
            .grow(sentence, set, span, index, nodes)
            .map(|nodes| Attachment {
                record: current.with_nodes(nodes),
                replaces: index,
            }))
    }

    fn logp(&self, sentence: &Sentence, set: &AlignmentSet, record: &Alignment) -> AlignResult<f64> {
        let span = sentence
            .span_index(record.span)
            .ok_or_else(|| CorpusError::InvalidSpan {
                sentence: sentence.id().to_string(),
                start: record.span.start,
                end: record.span.end,
            })?;
        Ok(self.model.logp(sentence, set, span, &record.nodes)?)
    }

    fn refine(&self, sentence: &Sentence, set: &mut AlignmentSet) -> AlignResult<bool> {
        if !self.config.align_duplicates {
            return Ok(false);
        }
        duplicates::resolve(self, sentence, set)?;
        Ok(true)
    }

    fn postprocess(&self, sentence: &Sentence, set: &mut AlignmentSet) -> AlignResult<()> {
        self.collapse_shared_nodes(sentence, set);
        set.remove_empty_duplicates();
        Ok(())
    }

    fn update_parameters(&mut self, corpus: &Corpus, alignments: &AlignmentCollection) -> AlignResult<()> {
        self.model = SubgraphModel::estimate(&self.config, corpus, alignments);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_sentence;

    fn config() -> AlignConfig {
        AlignConfig {
            english: false,
            ..AlignConfig::default()
        }
    }

    /// "John saw Mary" with see-01(:ARG0 John, :ARG1 Mary).
    fn john_saw_mary() -> Corpus {
        let mut g = SemanticGraph::new();
        let s = g.add_node("s", "see-01").unwrap();
        let j = g.add_node("j", "John").unwrap();
        let m = g.add_node("m", "Mary").unwrap();
        g.add_edge(s, ":ARG0", j).unwrap();
        g.add_edge(s, ":ARG1", m).unwrap();
        g.set_root(s).unwrap();
        let sentence = Sentence::new("s1", vec!["John".into(), "saw".into(), "Mary".into()], g)
            .with_lemmas(vec!["john".into(), "see".into(), "mary".into()])
            .unwrap();
        let mut corpus = Corpus::new();
        corpus.push(sentence).unwrap();
        corpus
    }

    fn gold(corpus: &Corpus) -> AlignmentCollection {
        let sentence = &corpus.sentences()[0];
        let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
        for (span, node) in [(0, 1), (1, 0), (2, 2)] {
            let record = set.records()[span].with_node(NodeId(node));
            set.replace(span, record);
        }
        [("s1".to_string(), set)].into_iter().collect()
    }

    #[test]
    fn empty_records_score_with_the_null_model() {
        let corpus = john_saw_mary();
        let aligner = SubgraphAligner::new(config(), &corpus);
        let sentence = &corpus.sentences()[0];
        let null = NullModel::from_corpus(&corpus, 0.05);
        assert_eq!(
            aligner.model().trans_logp(sentence, 1, &[]).unwrap(),
            null.logp(sentence, 1)
        );
    }

    #[test]
    fn seeded_counts_recover_gold() {
        let corpus = john_saw_mary();
        let mut aligner = SubgraphAligner::new(config(), &corpus);
        aligner.update_parameters(&corpus, &gold(&corpus)).unwrap();
        let sentence = &corpus.sentences()[0];
        let set = align_sentence(&aligner, sentence).unwrap();
        assert_eq!(set.node_owner(NodeId(1)).unwrap().span, sentence.span(0));
        assert_eq!(set.node_owner(NodeId(0)).unwrap().span, sentence.span(1));
        assert_eq!(set.node_owner(NodeId(2)).unwrap().span, sentence.span(2));
        set.validate(sentence).unwrap();
    }

    #[test]
    fn neighbor_spans_are_candidates() {
        let corpus = john_saw_mary();
        let aligner = SubgraphAligner::new(config(), &corpus);
        let sentence = &corpus.sentences()[0];
        let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
        set.replace(0, set.records()[0].with_node(NodeId(1)));
        let unaligned = aligner.unaligned(sentence, &set, Pass::Primary);
        let candidates = aligner.candidates_for(sentence, &set, &NodeId(0), &unaligned);
        assert_eq!(candidates, vec![0, 1, 2]);
        // Mary is a leaf sibling of John, so John's span is offered as well
        let candidates = aligner.candidates_for(sentence, &set, &NodeId(2), &unaligned);
        assert_eq!(candidates, vec![0, 1, 2]);
    }

    #[test]
    fn duplicates_wait_for_resolution() {
        let mut g = SemanticGraph::new();
        let c = g.add_node("c", "chase-01").unwrap();
        let d1 = g.add_node("d1", "dog").unwrap();
        let d2 = g.add_node("d2", "dog").unwrap();
        g.add_edge(c, ":ARG0", d1).unwrap();
        g.add_edge(c, ":ARG1", d2).unwrap();
        g.set_root(c).unwrap();
        let sentence = Sentence::new("d", vec!["dogs".into(), "chase".into()], g);
        let mut corpus = Corpus::new();
        corpus.push(sentence).unwrap();
        let sentence = &corpus.sentences()[0];
        let set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);

        let aligner = SubgraphAligner::new(config(), &corpus);
        assert_eq!(aligner.unaligned(sentence, &set, Pass::Primary), BTreeSet::from([c]));
        assert_eq!(aligner.unaligned(sentence, &set, Pass::Final).len(), 3);

        let ignoring = SubgraphAligner::new(
            AlignConfig {
                align_duplicates: false,
                ignore_duplicates: true,
                ..config()
            },
            &corpus,
        );
        assert_eq!(ignoring.unaligned(sentence, &set, Pass::Final), BTreeSet::from([c]));
        assert!(is_duplicate(sentence.graph(), d1));
        assert!(is_duplicate(sentence.graph(), d2));
        assert!(!is_duplicate(sentence.graph(), c));
    }

    #[test]
    fn neighbor_expansion_uses_each_span_own_words() {
        let mut g = SemanticGraph::new();
        let s = g.add_node("s", "smile-01").unwrap();
        let p = g.add_node("p", "person").unwrap();
        let w = g.add_node("w", "work-01").unwrap();
        g.add_edge(s, ":ARG0", p).unwrap();
        g.add_edge(p, ":ARG0-of", w).unwrap();
        g.set_root(s).unwrap();
        let sentence = Sentence::new("w1", vec!["worker".into(), "smiled".into()], g)
            .with_lemmas(vec!["worker".into(), "smile".into()])
            .unwrap();
        let mut corpus = Corpus::new();
        corpus.push(sentence).unwrap();
        let aligner = SubgraphAligner::new(AlignConfig::default(), &corpus);
        let sentence = &corpus.sentences()[0];

        let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
        set.replace(1, set.records()[1].with_node(s));
        let unaligned: BTreeSet<NodeId> = [p, w].into_iter().collect();
        // "worker" pulls the person in, but its smile neighbor sits on "smiled",
        // whose own words leave work-01 alone.
        let candidates = aligner.candidates_for(sentence, &set, &w, &unaligned);
        assert_eq!(candidates, vec![0]);
    }

    #[test]
    fn shared_nodes_collapse_onto_largest_record() {
        let corpus = john_saw_mary();
        let aligner = SubgraphAligner::new(config(), &corpus);
        let sentence = &corpus.sentences()[0];
        let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
        set.replace(0, set.records()[0].with_node(NodeId(1)));
        let both = set.records()[1].with_node(NodeId(0)).with_node(NodeId(1));
        set.replace(1, both);
        aligner.postprocess(sentence, &mut set).unwrap();
        assert!(set.records()[0].nodes.is_empty());
        assert_eq!(set.node_owners(NodeId(1)), vec![1]);
        set.validate(sentence).unwrap();
    }
}
