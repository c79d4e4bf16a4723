//! Joint resolution of identically-labeled nodes.
//!
//! When several unaligned nodes share a concept, aligning them one at a time
//! lets whichever is cheapest claim the best span. Instead, every node of the
//! group is scored against every candidate span and a maximum-weight matching
//! is committed. Nodes left over once the spans run out become secondary
//! `dupl-subgraph` records on their best span.

use std::collections::{BTreeMap, BTreeSet};

use crate::alignment::{Alignment, AlignmentKind, AlignmentSet};
use crate::error::AlignResult;
use crate::graph::{NodeId, SemanticGraph};
use crate::sentence::Sentence;

use super::{AlignmentTask, Pass, fragment_at};

/// Parents whose children are compared or equated rather than repeated.
pub const OVERLOADED_PARENTS: [&str; 6] = [
    "include-91",
    "same-01",
    "instead-of-91",
    "resemble-01",
    "and",
    "or",
];

/// Concepts too empty to justify a secondary record on an empty span.
pub const FILLERS: [&str; 4] = ["thing", "and", "-", "person"];

/// Largest span count solved exactly; larger groups fall back to greedy.
const EXACT_LIMIT: usize = 12;

/// Unaligned nodes grouped by concept, groups of two or more only.
pub fn duplicate_groups(graph: &SemanticGraph, unaligned: &BTreeSet<NodeId>) -> BTreeMap<String, Vec<NodeId>> {
    let mut groups: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for &node in unaligned {
        groups
            .entry(graph.concept(node).to_string())
            .or_default()
            .push(node);
    }
    groups.retain(|_, nodes| nodes.len() > 1);
    groups
}

/// Group members that must not be aligned as repetitions: nodes under an
/// overloaded parent that itself hangs off a group member, and every sibling
/// under an overloaded parent after the first.
pub fn overloaded_siblings(graph: &SemanticGraph, nodes: &[NodeId]) -> BTreeSet<NodeId> {
    let mut skip = BTreeSet::new();
    for &node in nodes {
        for parent in graph.parents(node) {
            if !OVERLOADED_PARENTS.contains(&graph.concept(parent)) {
                continue;
            }
            let nested = graph.parents(parent).iter().any(|g| nodes.contains(g));
            let later_sibling = graph
                .children(parent)
                .iter()
                .any(|&s| s < node && nodes.contains(&s));
            if nested || later_sibling {
                skip.insert(node);
            }
        }
    }
    skip
}

type Key = (usize, f64);

/// More matches first, then higher total score.
fn better(candidate: Key, incumbent: Option<Key>) -> bool {
    match incumbent {
        None => true,
        Some((count, total)) => candidate.0 > count || (candidate.0 == count && candidate.1 > total),
    }
}

fn usable(score: f64) -> bool {
    score > f64::NEG_INFINITY
}

/// Optimal assignment by dynamic programming over subsets of spans.
///
/// `scores[span][node]`; unusable scores never pair. Returns `(span, node)`
/// pairs ordered by node.
pub fn assign_exact(scores: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let spans = scores.len();
    let nodes = scores.first().map_or(0, Vec::len);
    let size = 1usize << spans;
    let mut layer: Vec<Option<Key>> = vec![None; size];
    layer[0] = Some((0, 0.0));
    let mut back: Vec<Vec<(usize, Option<usize>)>> = Vec::with_capacity(nodes);

    for node in 0..nodes {
        let mut next: Vec<Option<Key>> = vec![None; size];
        let mut from: Vec<(usize, Option<usize>)> = vec![(0, None); size];
        for mask in 0..size {
            let Some((count, total)) = layer[mask] else {
                continue;
            };
            if better((count, total), next[mask]) {
                next[mask] = Some((count, total));
                from[mask] = (mask, None);
            }
            for span in 0..spans {
                let score = scores[span][node];
                if mask & (1 << span) != 0 || !usable(score) {
                    continue;
                }
                let to = mask | (1 << span);
                let key = (count + 1, total + score);
                if better(key, next[to]) {
                    next[to] = Some(key);
                    from[to] = (mask, Some(span));
                }
            }
        }
        back.push(from);
        layer = next;
    }

    let mut end = 0;
    for mask in 1..size {
        if let Some(key) = layer[mask] {
            if better(key, layer[end]) {
                end = mask;
            }
        }
    }
    let mut pairs = Vec::new();
    let mut mask = end;
    for node in (0..nodes).rev() {
        let (previous, span) = back[node][mask];
        if let Some(span) = span {
            pairs.push((span, node));
        }
        mask = previous;
    }
    pairs.reverse();
    pairs
}

/// Highest-scoring pairs first, skipping taken spans and nodes.
pub fn assign_greedy(scores: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let mut ranked: Vec<(usize, usize, f64)> = scores
        .iter()
        .enumerate()
        .flat_map(|(span, row)| row.iter().enumerate().map(move |(node, &s)| (span, node, s)))
        .filter(|&(_, _, s)| usable(s))
        .collect();
    ranked.sort_by(|a, b| b.2.total_cmp(&a.2).then((a.0, a.1).cmp(&(b.0, b.1))));
    let mut spans = BTreeSet::new();
    let mut nodes = BTreeSet::new();
    let mut pairs = Vec::new();
    for (span, node, _) in ranked {
        if spans.contains(&span) || nodes.contains(&node) {
            continue;
        }
        spans.insert(span);
        nodes.insert(node);
        pairs.push((span, node));
    }
    pairs.sort_by_key(|&(_, node)| node);
    pairs
}

struct Group {
    concept: String,
    nodes: Vec<NodeId>,
    spans: Vec<usize>,
    score: f64,
}

/// True if the primary fragment at `span` holds a node of `concept`.
fn realizes(sentence: &Sentence, set: &AlignmentSet, span: usize, concept: &str) -> bool {
    let graph = sentence.graph();
    fragment_at(sentence, set, span)
        .iter()
        .any(|&n| graph.concept(n) == concept)
}

/// Spans a group member could start on by itself: no primary fragment yet,
/// or a fragment already realizing the concept. Spans of neighboring
/// fragments are excluded.
fn starting_spans(sentence: &Sentence, set: &AlignmentSet, concept: &str) -> Vec<usize> {
    (0..sentence.span_count())
        .filter(|&i| fragment_at(sentence, set, i).is_empty() || realizes(sentence, set, i, concept))
        .collect()
}

/// Best attachment score of `node` over `spans`, lowest span on ties.
fn best_start<T>(
    task: &T,
    sentence: &Sentence,
    set: &AlignmentSet,
    node: &NodeId,
    spans: &[usize],
) -> AlignResult<Option<(usize, f64)>>
where
    T: AlignmentTask<Item = NodeId>,
{
    let mut best: Option<(usize, f64)> = None;
    for &span in spans {
        if !task.is_legal_attachment(sentence, set, node, span) {
            continue;
        }
        let Some(attachment) = task.attach(sentence, set, node, span)? else {
            continue;
        };
        let score = task.score(sentence, set, &attachment)?;
        if usable(score) && best.is_none_or(|(_, b)| score > b) {
            best = Some((span, score));
        }
    }
    Ok(best)
}

/// Resolve every duplicate group of the sentence. Returns the number of
/// `dupl-subgraph` records added.
pub fn resolve<T>(task: &T, sentence: &Sentence, set: &mut AlignmentSet) -> AlignResult<usize>
where
    T: AlignmentTask<Item = NodeId>,
{
    let unaligned = task.unaligned(sentence, set, Pass::Final);
    let mut groups = Vec::new();
    for (concept, nodes) in duplicate_groups(sentence.graph(), &unaligned) {
        let starts = starting_spans(sentence, set, &concept);
        let mut labels = BTreeSet::new();
        let mut score = f64::NEG_INFINITY;
        for node in &nodes {
            if let Some((span, best)) = best_start(task, sentence, set, node, &starts)? {
                labels.insert(sentence.token_label(span));
                score = score.max(best);
            }
        }
        let spans = starts
            .into_iter()
            .filter(|&i| labels.contains(&sentence.token_label(i)) || realizes(sentence, set, i, &concept))
            .collect();
        groups.push(Group {
            concept,
            nodes,
            spans,
            score,
        });
    }
    groups.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.concept.cmp(&b.concept)));

    let mut added = 0;
    for group in &groups {
        added += resolve_group(task, sentence, set, group)?;
    }
    Ok(added)
}

fn resolve_group<T>(task: &T, sentence: &Sentence, set: &mut AlignmentSet, group: &Group) -> AlignResult<usize>
where
    T: AlignmentTask<Item = NodeId>,
{
    if group.spans.is_empty() {
        return Ok(0);
    }
    let skip = overloaded_siblings(sentence.graph(), &group.nodes);
    let nodes: Vec<NodeId> = group
        .nodes
        .iter()
        .copied()
        .filter(|n| !skip.contains(n))
        .collect();

    let mut scores = vec![vec![f64::NEG_INFINITY; nodes.len()]; group.spans.len()];
    for (i, &span) in group.spans.iter().enumerate() {
        for (j, node) in nodes.iter().enumerate() {
            if !task.is_legal_attachment(sentence, set, node, span) {
                continue;
            }
            if let Some(attachment) = task.attach(sentence, set, node, span)? {
                scores[i][j] = task.score(sentence, set, &attachment)?;
            }
        }
    }
    let pairs = if group.spans.len() <= EXACT_LIMIT {
        assign_exact(&scores)
    } else {
        assign_greedy(&scores)
    };

    let mut matched = BTreeSet::new();
    for &(i, j) in &pairs {
        if let Some(attachment) = task.attach(sentence, set, &nodes[j], group.spans[i])? {
            attachment.apply(set);
            matched.insert(j);
        }
    }

    // Leftovers score as standalone records, so a span whose fragment can
    // no longer absorb them still takes the duplicate.
    let mut added = 0;
    for &node in &nodes {
        if set.is_node_aligned(node) {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for &span in &group.spans {
            let record = Alignment::new(AlignmentKind::DuplicateSubgraph, sentence.span(span)).with_node(node);
            let logp = task.logp(sentence, set, &record)?;
            if usable(logp) && best.is_none_or(|(_, b)| logp > b) {
                best = Some((span, logp));
            }
        }
        let Some((span, _)) = best else {
            continue;
        };
        if fragment_at(sentence, set, span).is_empty() && FILLERS.contains(&group.concept.as_str()) {
            continue;
        }
        set.push(Alignment::new(AlignmentKind::DuplicateSubgraph, sentence.span(span)).with_node(node));
        added += 1;
    }
    tracing::debug!(
        sentence = sentence.id(),
        concept = %group.concept,
        nodes = group.nodes.len(),
        spans = group.spans.len(),
        matched = matched.len(),
        skipped = skip.len(),
        duplicated = added,
        "duplicate group resolved"
    );
    Ok(added)
}
