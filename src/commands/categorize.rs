//! Categorize sequencing reads against a set of pre-built Bloom filters.

use anyhow::{bail, Result};
use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};

use bloomsieve_lib::bloom::{self, FilterSet};
use bloomsieve_lib::classify::ClassifyMode;
use bloomsieve_lib::logging::OperationTimer;
use bloomsieve_lib::pipeline::{self, InputLayout, RunConfig};
use bloomsieve_lib::validation::{validate_file_exists, validate_unit_interval};

use crate::commands::command::Command;
use crate::commands::common::ThreadingOptions;

/// Categorize reads by Bloom filter membership.
///
/// Every read (or pair) is scored against each filter and routed to the
/// single filter that claimed it, or to the noMatch / multiMatch bins.
#[derive(Debug, Parser)]
#[command(
    name = "categorize",
    about = "Categorize reads against pre-built Bloom filters",
    long_about = r#"
Categorize sequencing reads by testing each read (or read pair) against a set
of pre-built Bloom filters, one per reference category. Each read is routed to
the category whose filter claimed it, or to the noMatch / multiMatch bins, and
a per-filter summary TSV is written at the end of the run.

Inputs may be FASTA or FASTQ, plain or gzip-compressed; the format is detected
from the file contents. All filters in one run must share a single k-mer size.

A score threshold of exactly 1.0 selects best-hit assignment for
compatibility with older tools; use --mode to pick a mode explicitly.

Example usage:
  bloomsieve categorize -f "human.bf mouse.bf" -p run1 reads.fq.gz
  bloomsieve categorize -f human.bf -e -o -p run2 r1.fq.gz r2.fq.gz
  bloomsieve categorize -f "a.bf b.bf" --mode scores --scores-out -p run3 reads.fq
"#
)]
pub struct Categorize {
    /// Bloom filter files (.bf); each requires its sidecar info file (.txt).
    /// Repeat the flag or quote a space-separated list.
    #[arg(short = 'f', long = "filter", required = true, value_delimiter = ' ')]
    pub filters: Vec<PathBuf>,

    /// Input read files: FASTA/FASTQ, optionally gzip-compressed. In paired
    /// mode, files are consumed as consecutive mate-1/mate-2 pairs.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output prefix for the summary and routed read files
    #[arg(short = 'p', long = "prefix", default_value = "bloomsieve")]
    pub prefix: String,

    /// Score threshold in [0, 1]: the fraction of a read's k-mers a filter
    /// must claim
    #[arg(short = 's', long = "score", default_value_t = 0.2)]
    pub score: f64,

    /// Classification mode; by default std, or best-hit when --score is 1.0
    #[arg(long = "mode", value_enum)]
    pub mode: Option<ClassifyMode>,

    /// Write categorized reads to one output file per destination bin
    #[arg(short = 'o', long = "output-reads")]
    pub output_reads: bool,

    /// Gzip-compress routed read output
    #[arg(short = 'g', long = "gzip-output")]
    pub gzip_output: bool,

    /// Paired mode: inputs are consecutive mate-1/mate-2 file pairs
    #[arg(short = 'e', long = "paired", conflicts_with = "interleaved")]
    pub paired: bool,

    /// Interleaved paired mode: mates share one file and pair by read ID
    /// (requires /1-/2 style ID suffixes)
    #[arg(short = 'i', long = "interleaved")]
    pub interleaved: bool,

    /// A filter claims a pair when either mate passes (default: both must)
    #[arg(long = "inclusive")]
    pub inclusive: bool,

    /// Also write raw per-destination assignment counts
    #[arg(short = 'c', long = "counts")]
    pub counts: bool,

    /// Also write a per-read score table (scores / best-hit modes)
    #[arg(long = "scores-out")]
    pub scores_out: bool,

    /// Discard reads the platform flagged as failing chastity
    #[arg(long = "chastity", overrides_with = "no_chastity")]
    pub chastity: bool,

    /// Keep and evaluate unchaste reads (default)
    #[arg(long = "no-chastity")]
    pub no_chastity: bool,

    /// Log progress every N reads
    #[arg(long = "progress-interval", default_value_t = 1_000_000)]
    pub progress_interval: u64,

    /// Threading options
    #[command(flatten)]
    pub threading: ThreadingOptions,
}

impl Categorize {
    fn validate(&self) -> Result<()> {
        validate_unit_interval(self.score, "score")?;
        for path in &self.filters {
            validate_file_exists(path, "Filter file")?;
            validate_file_exists(bloom::sidecar_path(path), "Filter info file")?;
        }
        for path in &self.inputs {
            validate_file_exists(path, "Input file")?;
        }
        if self.paired && self.inputs.len() % 2 != 0 {
            bail!(
                "paired mode consumes inputs as mate-1/mate-2 file pairs, \
                 but {} input files were given",
                self.inputs.len()
            );
        }
        if self.scores_out {
            let effective = self.mode.unwrap_or(if self.score == 1.0 {
                ClassifyMode::BestHit
            } else {
                ClassifyMode::Std
            });
            if !matches!(effective, ClassifyMode::BestHit | ClassifyMode::Scores) {
                bail!("--scores-out requires --mode scores or --mode best-hit");
            }
        }
        // Fail before the run, not after, when the output directory is absent
        if let Some(parent) = Path::new(&self.prefix).parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("output directory '{}' does not exist", parent.display());
            }
        }
        Ok(())
    }

    fn input_layout(&self) -> InputLayout {
        if self.interleaved {
            InputLayout::Interleaved(self.inputs.clone())
        } else if self.paired {
            let pairs = self
                .inputs
                .chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
            InputLayout::PairedFiles(pairs)
        } else {
            InputLayout::Single(self.inputs.clone())
        }
    }
}

impl Command for Categorize {
    fn execute(&self) -> Result<()> {
        self.validate()?;

        info!("Loading {} filters", self.filters.len());
        let filters = FilterSet::load(&self.filters)?;
        info!("Filter loading complete (k={})", filters.kmer_size());

        let workers = self.threading.num_threads();
        info!("Using {workers} worker threads");

        let config = RunConfig {
            threshold: self.score,
            mode: self.mode,
            inclusive: self.inclusive,
            chastity_filter: self.chastity,
            progress_interval: self.progress_interval,
            workers,
            route_reads: self.output_reads,
            gzip_output: self.gzip_output,
            prefix: self.prefix.clone(),
            write_counts: self.counts,
            write_scores: self.scores_out,
        };

        let timer = OperationTimer::new("Categorizing reads");
        let summary = pipeline::run(&config, filters, self.input_layout())?;
        timer.log_completion(summary.total_reads);

        if summary.unchaste_reads > 0 {
            info!("Discarded {} unchaste reads", summary.unchaste_reads);
        }
        if summary.orphaned_reads > 0 {
            info!("Encountered {} orphaned interleaved reads", summary.orphaned_reads);
        }
        Ok(())
    }
}
