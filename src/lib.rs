// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # amr-align
//!
//! Unsupervised alignment of semantic graphs (AMR-style) to the token spans
//! of the sentences they describe.
//!
//! ## Architecture
//!
//! - **Graph model** (`graph`): petgraph-backed rooted multigraph with
//!   connectivity queries
//! - **Scoring models** (`model`): smoothed translation counts with backoff,
//!   frequency-rank null model, Skellam/Gaussian distance models
//! - **Assignment engine** (`align`): one greedy best-first loop shared by the
//!   subgraph, relation and reentrancy tasks, with repair and duplicate
//!   resolution
//! - **Training** (`train`): epochs of align-then-reestimate, and the
//!   three-stage pipeline
//!
//! ## Library usage
//!
//! ```no_run
//! use amr_align::config::AlignConfig;
//! use amr_align::corpus::Corpus;
//! use amr_align::train::run_pipeline;
//!
//! let corpus = Corpus::load("corpus.json".as_ref()).unwrap();
//! let output = run_pipeline(&AlignConfig::default(), &corpus).unwrap();
//! println!("{} subgraph records", output.subgraphs.record_count());
//! ```

pub mod align;
pub mod alignment;
pub mod config;
pub mod corpus;
pub mod error;
pub mod graph;
pub mod labels;
pub mod model;
pub mod rules;
pub mod sentence;
pub mod train;
