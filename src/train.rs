//! Parameter reestimation loop and the three-stage pipeline.
//!
//! Each epoch aligns the whole corpus against a frozen model, then rebuilds
//! every model parameter from the result. The loop runs a fixed number of
//! epochs; perplexity is reported, and only stops training when the caller
//! opts in.

use std::fmt;
use std::time::{Duration, Instant};

use crate::align::{
    AlignmentTask, Coverage, ReentrancyAligner, RelationAligner, SubgraphAligner, align_corpus, coverage,
    perplexity,
};
use crate::alignment::AlignmentCollection;
use crate::config::AlignConfig;
use crate::corpus::Corpus;
use crate::error::AlignResult;

/// Diagnostics for one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub perplexity: f64,
    pub coverage: Coverage,
    pub elapsed: Duration,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch {}: perplexity {:.4}, coverage {}, {:.2?}",
            self.epoch, self.perplexity, self.coverage, self.elapsed
        )
    }
}

/// What a training run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub task: String,
    pub epochs: Vec<EpochReport>,
    /// Set when training stopped on a perplexity increase; the returned
    /// alignments are then those of the epoch before.
    pub stopped_early: bool,
}

impl TrainingReport {
    pub fn last(&self) -> Option<&EpochReport> {
        self.epochs.last()
    }

    pub fn final_coverage(&self) -> Coverage {
        self.last().map(|e| e.coverage).unwrap_or_default()
    }
}

/// Runs epochs of align-then-reestimate over one task.
#[derive(Debug, Clone)]
pub struct Trainer {
    epochs: usize,
    stop_on_perplexity_increase: bool,
}

impl Trainer {
    pub fn new(config: &AlignConfig) -> Self {
        Self {
            epochs: config.num_epochs,
            stop_on_perplexity_increase: config.stop_on_perplexity_increase,
        }
    }

    /// Override the configured epoch count.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Train `task` on `corpus` and return the final alignments.
    ///
    /// With zero epochs the task aligns once with its initial parameters
    /// and nothing is reestimated.
    pub fn train<T: AlignmentTask>(
        &self,
        task: &mut T,
        corpus: &Corpus,
    ) -> AlignResult<(AlignmentCollection, TrainingReport)> {
        let mut report = TrainingReport {
            task: task.name().to_string(),
            ..TrainingReport::default()
        };
        if self.epochs == 0 {
            return Ok((align_corpus(task, corpus)?, report));
        }

        let mut previous: Option<AlignmentCollection> = None;
        for epoch in 0..self.epochs {
            let started = Instant::now();
            let alignments = align_corpus(task, corpus)?;
            task.update_parameters(corpus, &alignments)?;
            let current = EpochReport {
                epoch,
                perplexity: perplexity(task, corpus, &alignments)?,
                coverage: coverage(task, corpus, &alignments),
                elapsed: started.elapsed(),
            };
            tracing::info!(
                task = task.name(),
                epoch,
                perplexity = current.perplexity,
                coverage = %current.coverage,
                elapsed_ms = current.elapsed.as_millis() as u64,
                "epoch finished"
            );

            let worse = report
                .last()
                .is_some_and(|last| current.perplexity > last.perplexity);
            report.epochs.push(current);
            if self.stop_on_perplexity_increase && worse {
                if let Some(previous) = previous {
                    tracing::info!(task = task.name(), epoch, "perplexity increased, stopping");
                    report.stopped_early = true;
                    return Ok((previous, report));
                }
            }
            previous = Some(alignments);
        }
        Ok((previous.unwrap_or_default(), report))
    }
}

/// Output of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub subgraphs: AlignmentCollection,
    pub relations: AlignmentCollection,
    pub reentrancies: AlignmentCollection,
    pub reports: Vec<TrainingReport>,
}

/// Subgraphs, then relations over the subgraphs, then reentrancies over
/// both.
pub fn run_pipeline(config: &AlignConfig, corpus: &Corpus) -> AlignResult<PipelineOutput> {
    let trainer = Trainer::new(config);

    tracing::info!(sentences = corpus.len(), "aligning subgraphs");
    let mut subgraph_task = SubgraphAligner::new(config.clone(), corpus);
    let (subgraphs, subgraph_report) = trainer.train(&mut subgraph_task, corpus)?;

    tracing::info!("aligning relations");
    let mut relation_task = RelationAligner::new(config.clone(), corpus, subgraphs.clone());
    let (relations, relation_report) = trainer.train(&mut relation_task, corpus)?;

    tracing::info!("aligning reentrancies");
    let mut reentrancy_task = ReentrancyAligner::new(config.clone(), subgraphs.clone(), relations.clone());
    let (reentrancies, reentrancy_report) = trainer.train(&mut reentrancy_task, corpus)?;

    Ok(PipelineOutput {
        subgraphs,
        relations,
        reentrancies,
        reports: vec![subgraph_report, relation_report, reentrancy_report],
    })
}
