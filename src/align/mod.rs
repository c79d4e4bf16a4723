//! Greedy best-first assignment engine.
//!
//! One engine drives all three alignment tasks. A task supplies its items,
//! candidate spans, label function and scoring through [`AlignmentTask`];
//! the engine repeatedly scores every (unaligned item, candidate span) pair
//! and commits the single global best until nothing legal remains.
//!
//! Sentence-level state machine:
//!
//! ```text
//! Initializing ──▶ Scoring ──▶ Committing ──▶ Scoring ... ──▶ Converged
//! ```
//!
//! Ties are broken deterministically: items are visited in ascending order
//! (node id, or edge triple), spans in ascending position, and a later pair
//! only wins with a strictly greater score. The first best pair in that order
//! is committed.

pub mod duplicates;
pub mod reentrancy;
pub mod relation;
pub mod repair;
pub mod subgraph;

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

use rayon::prelude::*;

use crate::alignment::{Alignment, AlignmentCollection, AlignmentKind, AlignmentSet};
use crate::corpus::Corpus;
use crate::error::{AlignResult, EngineError};
use crate::graph::NodeId;
use crate::sentence::Sentence;

pub use reentrancy::ReentrancyAligner;
pub use relation::RelationAligner;
pub use subgraph::SubgraphAligner;

/// Engine state for one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    Scoring,
    Committing,
    Converged,
}

/// Which greedy pass is running. Tasks with a refinement step between two
/// passes (duplicate resolution) may expose different items in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Primary,
    Final,
}

/// A hypothetical record and the committed record it would replace.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub record: Alignment,
    /// Index in the sentence's set, or `None` to append.
    pub replaces: Option<usize>,
}

impl Attachment {
    /// Commit into `set`.
    pub fn apply(self, set: &mut AlignmentSet) {
        match self.replaces {
            Some(index) => set.replace(index, self.record),
            None => {
                set.push(self.record);
            }
        }
    }
}

/// Capability interface one alignment task implements.
pub trait AlignmentTask: Send + Sync {
    /// What gets aligned: nodes, edges, or reentrant edges.
    type Item: Clone + Ord + Hash + Debug + Send + Sync;
    /// Canonical fragment label.
    type Label: Clone + Eq + Hash + Debug + Send + Sync;

    fn name(&self) -> &'static str;

    /// Every item of the sentence this task is responsible for.
    fn items(&self, sentence: &Sentence) -> BTreeSet<Self::Item>;

    /// True once any record in `set` covers `item`.
    fn is_aligned(&self, set: &AlignmentSet, item: &Self::Item) -> bool;

    /// Records to start from. Cheap deterministic rules may pre-fill them.
    fn initial_alignments(&self, sentence: &Sentence) -> AlignResult<AlignmentSet>;

    /// Items still to align in `pass`.
    fn unaligned(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        _pass: Pass,
    ) -> BTreeSet<Self::Item> {
        self.items(sentence)
            .into_iter()
            .filter(|item| !self.is_aligned(set, item))
            .collect()
    }

    fn label_of(&self, sentence: &Sentence, record: &Alignment) -> Self::Label;

    /// Structurally plausible span positions for `item`, ascending.
    fn candidates_for(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        item: &Self::Item,
        unaligned: &BTreeSet<Self::Item>,
    ) -> Vec<usize>;

    /// Whether the record at `span` may absorb `item`.
    fn is_legal_attachment(
        &self,
        _sentence: &Sentence,
        _set: &AlignmentSet,
        _item: &Self::Item,
        _span: usize,
    ) -> bool {
        true
    }

    /// Build the candidate record for `item` at `span`, or `None` if no
    /// acceptable record exists (e.g. repair would lose the item).
    fn attach(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        item: &Self::Item,
        span: usize,
    ) -> AlignResult<Option<Attachment>>;

    /// Log-probability of a record given the committed state.
    fn logp(&self, sentence: &Sentence, set: &AlignmentSet, record: &Alignment) -> AlignResult<f64>;

    /// Marginal gain of committing `attachment`: the candidate's score minus
    /// the score of the record it replaces.
    fn score(
        &self,
        sentence: &Sentence,
        set: &AlignmentSet,
        attachment: &Attachment,
    ) -> AlignResult<f64> {
        let new = self.logp(sentence, set, &attachment.record)?;
        let old = match attachment.replaces.and_then(|i| set.get(i)) {
            Some(record) => self.logp(sentence, set, record)?,
            None => 0.0,
        };
        Ok(new - old)
    }

    /// Hook between the primary and final pass. Returns true if a final pass
    /// should run.
    fn refine(&self, _sentence: &Sentence, _set: &mut AlignmentSet) -> AlignResult<bool> {
        Ok(false)
    }

    /// Cleanup after convergence.
    fn postprocess(&self, _sentence: &Sentence, _set: &mut AlignmentSet) -> AlignResult<()> {
        Ok(())
    }

    /// Rebuild every model parameter from a completed collection.
    fn update_parameters(
        &mut self,
        corpus: &Corpus,
        alignments: &AlignmentCollection,
    ) -> AlignResult<()>;
}

/// The winning pair of one scoring round.
pub struct Candidate<I> {
    pub item: I,
    pub span: usize,
    pub score: f64,
    pub attachment: Attachment,
}

/// Best legal candidate for one item, or `None` if no span scores above −∞.
pub fn best_for_item<T: AlignmentTask>(
    task: &T,
    sentence: &Sentence,
    set: &AlignmentSet,
    item: &T::Item,
    unaligned: &BTreeSet<T::Item>,
) -> AlignResult<Option<Candidate<T::Item>>> {
    let mut best: Option<Candidate<T::Item>> = None;
    for span in task.candidates_for(sentence, set, item, unaligned) {
        if !task.is_legal_attachment(sentence, set, item, span) {
            continue;
        }
        let Some(attachment) = task.attach(sentence, set, item, span)? else {
            continue;
        };
        let score = task.score(sentence, set, &attachment)?;
        // rejects -inf and NaN
        if !(score > f64::NEG_INFINITY) {
            continue;
        }
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(Candidate {
                item: item.clone(),
                span,
                score,
                attachment,
            });
        }
    }
    Ok(best)
}

/// Global argmax over every unaligned item.
fn best_candidate<T: AlignmentTask>(
    task: &T,
    sentence: &Sentence,
    set: &AlignmentSet,
    unaligned: &BTreeSet<T::Item>,
) -> AlignResult<Option<Candidate<T::Item>>> {
    let mut best: Option<Candidate<T::Item>> = None;
    for item in unaligned {
        if let Some(candidate) = best_for_item(task, sentence, set, item, unaligned)? {
            if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
    }
    Ok(best)
}

/// Run one greedy pass to convergence. Returns the number of commits.
pub fn greedy_pass<T: AlignmentTask>(
    task: &T,
    sentence: &Sentence,
    set: &mut AlignmentSet,
    pass: Pass,
) -> AlignResult<usize> {
    let mut unaligned = task.unaligned(sentence, set, pass);
    let cap = unaligned.len();
    let mut commits = 0;
    let mut state = EngineState::Scoring;
    while state != EngineState::Converged {
        tracing::trace!(sentence = sentence.id(), task = task.name(), ?state, remaining = unaligned.len());
        if unaligned.is_empty() {
            state = EngineState::Converged;
            continue;
        }
        let Some(best) = best_candidate(task, sentence, set, &unaligned)? else {
            state = EngineState::Converged;
            continue;
        };
        state = EngineState::Committing;
        tracing::trace!(
            sentence = sentence.id(),
            task = task.name(),
            ?state,
            item = ?best.item,
            span = %sentence.span(best.span),
            score = best.score,
            label = ?task.label_of(sentence, &best.attachment.record),
            "commit"
        );
        best.attachment.apply(set);
        let remaining = task.unaligned(sentence, set, pass);
        if remaining.len() >= unaligned.len() {
            return Err(EngineError::NoProgress {
                sentence: sentence.id().to_string(),
                task: task.name().to_string(),
                before: unaligned.len(),
                after: remaining.len(),
            }
            .into());
        }
        commits += 1;
        if commits > cap {
            return Err(EngineError::IterationCap {
                sentence: sentence.id().to_string(),
                task: task.name().to_string(),
                cap,
            }
            .into());
        }
        unaligned = remaining;
        state = EngineState::Scoring;
    }
    tracing::debug!(
        sentence = sentence.id(),
        task = task.name(),
        ?pass,
        commits,
        unaligned = unaligned.len(),
        "converged"
    );
    Ok(commits)
}

/// Align one sentence from the task's initial records.
pub fn align_sentence<T: AlignmentTask>(task: &T, sentence: &Sentence) -> AlignResult<AlignmentSet> {
    tracing::trace!(sentence = sentence.id(), task = task.name(), state = ?EngineState::Initializing);
    let mut set = task.initial_alignments(sentence)?;
    greedy_pass(task, sentence, &mut set, Pass::Primary)?;
    if task.refine(sentence, &mut set)? {
        greedy_pass(task, sentence, &mut set, Pass::Final)?;
    }
    task.postprocess(sentence, &mut set)?;
    Ok(set)
}

/// Align every sentence in parallel against a frozen task snapshot.
pub fn align_corpus<T: AlignmentTask>(task: &T, corpus: &Corpus) -> AlignResult<AlignmentCollection> {
    corpus
        .sentences()
        .par_iter()
        .map(|sentence| align_sentence(task, sentence).map(|set| (sentence.id().to_string(), set)))
        .collect::<AlignResult<Vec<_>>>()
        .map(|sets| sets.into_iter().collect())
}

/// Span index of the primary record owning `node`.
pub(crate) fn owner_span(sentence: &Sentence, set: &AlignmentSet, node: NodeId) -> Option<usize> {
    set.node_owner(node)
        .and_then(|record| sentence.span_index(record.span))
}

/// Nodes of the subgraph record anchored on span `index`.
pub(crate) fn fragment_at<'a>(sentence: &Sentence, subgraphs: &'a AlignmentSet, index: usize) -> &'a [NodeId] {
    subgraphs
        .find(AlignmentKind::Subgraph, sentence.span(index))
        .and_then(|i| subgraphs.get(i))
        .map(|r| r.nodes.as_slice())
        .unwrap_or(&[])
}

/// Fraction of a task's items covered by a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coverage {
    pub aligned: usize,
    pub total: usize,
}

impl Coverage {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.aligned as f64 / self.total as f64
        }
    }
}

impl std::fmt::Display for Coverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({:.2}%)",
            self.aligned,
            self.total,
            100.0 * self.fraction()
        )
    }
}

/// Count covered items across the corpus. Sentences without alignments
/// count as fully uncovered.
pub fn coverage<T: AlignmentTask>(
    task: &T,
    corpus: &Corpus,
    alignments: &AlignmentCollection,
) -> Coverage {
    let empty = AlignmentSet::new();
    corpus
        .sentences()
        .iter()
        .fold(Coverage::default(), |mut acc, sentence| {
            let set = alignments.get(sentence.id()).unwrap_or(&empty);
            for item in task.items(sentence) {
                acc.total += 1;
                if task.is_aligned(set, &item) {
                    acc.aligned += 1;
                }
            }
            acc
        })
}

/// `exp(−mean record log-probability)` over every record of the collection.
pub fn perplexity<T: AlignmentTask>(
    task: &T,
    corpus: &Corpus,
    alignments: &AlignmentCollection,
) -> AlignResult<f64> {
    let mut total = 0.0;
    let mut count = 0usize;
    for (id, set) in alignments.iter() {
        let sentence = corpus.require(id)?;
        for record in set {
            total += task.logp(sentence, set, record)?;
            count += 1;
        }
    }
    Ok(if count == 0 {
        1.0
    } else {
        (-total / count as f64).exp()
    })
}
