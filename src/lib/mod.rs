#![deny(unsafe_code)]
// Clippy lint configuration for CI
// These lints are allowed because:
// - cast_*: Scientific/bioinformatics code intentionally casts between numeric types
// - missing_*_doc: Documentation improvements tracked separately
// - needless_pass_by_value: Some APIs designed for ownership transfer
// - module_name_repetitions: Names like BloomFilter in bloom are clearer
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

//! # bloomsieve - Bloom-filter read categorization library
//!
//! This library categorizes biological sequencing reads by testing each read
//! (or read pair) against a set of pre-built Bloom filters, one per reference
//! category, and routing the read to the category that claimed it or to the
//! no-match / multi-match bins.
//!
//! ## Overview
//!
//! The classification engine is built from small modules, leaves first:
//!
//! - **[`kmer`]** - canonical bit-packed k-mer extraction with early strand
//!   commitment
//! - **[`bloom`]** - Bloom filter membership tests and filter/sidecar loading
//! - **[`seq_eval`]** - per-read scoring with an early-exit threshold scan
//! - **[`classify`]** - the four classification modes and paired-end semantics
//! - **[`results`]** - the thread-safe results tally and run summary
//! - **[`pipeline`]** - the producer/worker/writer machine that drives a run
//! - **[`records`]** - FASTA/FASTQ record sources over plain or gzip input
//! - **[`output`]** - per-destination record routing with optional compression
//!
//! ## Quick start
//!
//! ```no_run
//! use bloomsieve_lib::bloom::FilterSet;
//! use bloomsieve_lib::pipeline::{self, InputLayout, RunConfig};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), bloomsieve_lib::errors::SieveError> {
//! let filters = FilterSet::load(&[PathBuf::from("human.bf")])?;
//! let config = RunConfig { threshold: 0.2, workers: 8, ..RunConfig::default() };
//! let summary = pipeline::run(
//!     &config,
//!     filters,
//!     InputLayout::Single(vec![PathBuf::from("reads.fq.gz")]),
//! )?;
//! println!("classified {} reads", summary.total_reads);
//! # Ok(())
//! # }
//! ```

pub mod bloom;
pub mod classify;
pub mod errors;
pub mod kmer;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod results;
pub mod seq_eval;
pub mod validation;

// Re-export the types most callers need
pub use bloom::{BloomFilter, FilterSet};
pub use classify::{Classifier, ClassifyMode, Verdict};
pub use errors::SieveError;
pub use results::Destination;
