//! Rich diagnostic error types for the aligner.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Conditions the aligner
//! handles locally (no legal candidate, unseen fragment labels, disconnected
//! candidates) never surface here; what remains are input and programmer errors.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the aligner.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum AlignError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node {node} does not belong to this graph")]
    #[diagnostic(
        code(align::graph::foreign_node),
        help(
            "Every node referenced by an alignment must come from the sentence's own graph. \
             A node id from another sentence was probably passed in."
        )
    )]
    ForeignNode { node: u32 },

    #[error("edge ({source_name}, {relation}, {target_name}) does not belong to this graph")]
    #[diagnostic(
        code(align::graph::foreign_edge),
        help("Edges must be declared in the graph before an alignment can own them.")
    )]
    ForeignEdge {
        source_name: String,
        relation: String,
        target_name: String,
    },

    #[error("no node named \"{name}\"")]
    #[diagnostic(
        code(align::graph::unknown_name),
        help("Node names in edges and alignment files must match a declared node id.")
    )]
    UnknownNodeName { name: String },

    #[error("node name \"{name}\" is declared twice")]
    #[diagnostic(
        code(align::graph::duplicate_name),
        help("Node ids must be unique within one graph.")
    )]
    DuplicateNodeName { name: String },

    #[error("graph has nodes but no root")]
    #[diagnostic(
        code(align::graph::missing_root),
        help("Set the `root` field to the id of the top node of the graph.")
    )]
    MissingRoot,
}

// ---------------------------------------------------------------------------
// Corpus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("sentence {sentence}: spans do not partition the tokens: {message}")]
    #[diagnostic(
        code(align::corpus::invalid_partition),
        help(
            "Spans must be ordered, contiguous, non-empty and cover every token exactly once. \
             Check the preprocessing output for this sentence."
        )
    )]
    InvalidPartition { sentence: String, message: String },

    #[error("sentence {sentence}: {field} has {actual} entries, expected {expected}")]
    #[diagnostic(
        code(align::corpus::length_mismatch),
        help("Lemmas and POS tags must be aligned one-to-one with tokens.")
    )]
    LengthMismatch {
        sentence: String,
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("sentence id \"{id}\" appears more than once")]
    #[diagnostic(
        code(align::corpus::duplicate_sentence),
        help("Sentence ids key the alignment output and must be unique.")
    )]
    DuplicateSentence { id: String },

    #[error("no sentence with id \"{id}\"")]
    #[diagnostic(
        code(align::corpus::unknown_sentence),
        help("The alignment file refers to a sentence that is not in the corpus.")
    )]
    UnknownSentence { id: String },

    #[error("sentence {sentence}: no {task} alignments available")]
    #[diagnostic(
        code(align::corpus::missing_alignments),
        help(
            "Relation alignment needs subgraph alignments, and reentrancy alignment needs both. \
             Run the earlier stages first or pass their output files."
        )
    )]
    MissingAlignments { sentence: String, task: String },

    #[error("sentence {sentence}: token span {start}..{end} is not one of the sentence's spans")]
    #[diagnostic(
        code(align::corpus::invalid_span),
        help("Alignment records must be anchored on spans from the sentence's partition.")
    )]
    InvalidSpan {
        sentence: String,
        start: usize,
        end: usize,
    },

    #[error("sentence {sentence}: {item} is owned by more than one primary record")]
    #[diagnostic(
        code(align::corpus::double_ownership),
        help("A node or edge may have at most one primary owner; extra owners must be dupl-* records.")
    )]
    DoubleOwnership { sentence: String, item: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(align::corpus::io),
        help("Check that the file exists and is readable (or the directory is writable).")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {message}")]
    #[diagnostic(
        code(align::corpus::parse),
        help("The file must be JSON in the documented corpus or alignment layout.")
    )]
    Parse { what: String, message: String },
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("improper probability: log p = {logp} in {context}")]
    #[diagnostic(
        code(align::model::improper_probability),
        help(
            "A probability greater than one was computed. This is a bug in the scoring \
             model or its counts, not a data problem; please report it."
        )
    )]
    ImproperProbability { logp: f64, context: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(
        "sentence {sentence}: {task} commit did not shrink the unaligned set ({before} -> {after})"
    )]
    #[diagnostic(
        code(align::engine::no_progress),
        help(
            "Every committed candidate must align at least one new item. \
             A task produced a candidate that does not cover the item it was scored for."
        )
    )]
    NoProgress {
        sentence: String,
        task: String,
        before: usize,
        after: usize,
    },

    #[error("sentence {sentence}: {task} exceeded {cap} commits")]
    #[diagnostic(
        code(align::engine::iteration_cap),
        help("The greedy loop ran longer than the number of items it started with.")
    )]
    IterationCap {
        sentence: String,
        task: String,
        cap: usize,
    },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    #[diagnostic(
        code(align::config::read),
        help("Check that the configuration file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    #[diagnostic(
        code(align::config::parse),
        help("The configuration file must be valid TOML. Unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("cannot write config {path}: {message}")]
    #[diagnostic(code(align::config::write))]
    Write { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(align::config::invalid),
        help("See `amr-align config` for the effective defaults.")
    )]
    Invalid { message: String },
}

/// Convenience result type for aligner operations.
pub type AlignResult<T> = std::result::Result<T, AlignError>;
