//! Thread-safe tally of classification outcomes and the run summary.
//!
//! Every read (or pair) lands in exactly one destination: the single filter
//! that claimed it, the no-match bin, or the multi-match bin. The tally
//! tracks assignments per destination plus a per-filter "hit anywhere"
//! count (reads whose hit set contained the filter, regardless of where the
//! read was finally routed), all with atomic counters so workers never
//! contend on a lock.

use fgoxide::io::DelimFile;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{Result, SieveError};

/// Label of the bin for reads no filter claimed.
pub const NO_MATCH_LABEL: &str = "noMatch";
/// Label of the bin for reads claimed by two or more filters.
pub const MULTI_MATCH_LABEL: &str = "multiMatch";

/// Where a read is routed after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Claimed by exactly the filter at this index
    Filter(usize),
    /// Claimed by no filter
    NoMatch,
    /// Claimed by two or more filters
    MultiMatch,
}

impl Destination {
    /// Dense index for destination-keyed arrays: filters first, then the
    /// no-match and multi-match bins.
    #[must_use]
    pub fn index(self, num_filters: usize) -> usize {
        match self {
            Destination::Filter(i) => i,
            Destination::NoMatch => num_filters,
            Destination::MultiMatch => num_filters + 1,
        }
    }

    /// The destination's bin label.
    #[must_use]
    pub fn label(self, labels: &[String]) -> &str {
        match self {
            Destination::Filter(i) => &labels[i],
            Destination::NoMatch => NO_MATCH_LABEL,
            Destination::MultiMatch => MULTI_MATCH_LABEL,
        }
    }
}

/// One row of the summary TSV.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    /// Filter label, or a synthetic bin label for the trailing rows
    pub filter_id: String,
    /// Reads whose hit set contained this filter (assigned reads for the
    /// synthetic bins)
    pub hits: u64,
    /// `hits` as a proportion of all reads seen
    pub proportion: f64,
    /// Running sum of `proportion` down the table
    pub cumulative: f64,
}

/// One row of the optional raw counts TSV.
#[derive(Debug, Clone, Serialize)]
pub struct CountsRow {
    /// Destination bin label
    pub destination: String,
    /// Reads assigned to the bin
    pub reads: u64,
}

/// Atomic counter matrix for one classification run.
pub struct ResultsTally {
    labels: Vec<String>,
    /// Assignments per destination; length `labels.len() + 2`.
    assigned: Vec<AtomicU64>,
    /// Per-filter count of reads whose hit set contained the filter.
    hit_anywhere: Vec<AtomicU64>,
    total: AtomicU64,
}

impl ResultsTally {
    /// Creates a zeroed tally for the given filter labels.
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            assigned: (0..n + 2).map(|_| AtomicU64::new(0)).collect(),
            hit_anywhere: (0..n).map(|_| AtomicU64::new(0)).collect(),
            total: AtomicU64::new(0),
        }
    }

    /// Records one read's hit set and returns its destination so the caller
    /// can route the record without recomputing it.
    pub fn record(&self, hits: &[usize]) -> Destination {
        let dest = match hits {
            [] => Destination::NoMatch,
            [single] => Destination::Filter(*single),
            _ => Destination::MultiMatch,
        };
        self.assigned[dest.index(self.labels.len())].fetch_add(1, Ordering::Relaxed);
        for &i in hits {
            self.hit_anywhere[i].fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        dest
    }

    /// Total reads recorded.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Reads assigned to a destination.
    #[must_use]
    pub fn assigned(&self, dest: Destination) -> u64 {
        self.assigned[dest.index(self.labels.len())].load(Ordering::Relaxed)
    }

    /// Reads whose hit set contained filter `i`.
    #[must_use]
    pub fn hit_anywhere(&self, i: usize) -> u64 {
        self.hit_anywhere[i].load(Ordering::Relaxed)
    }

    /// The filter labels this tally was built over.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Builds the summary table: one row per filter with its hit-anywhere
    /// count, then the trailing no-match and multi-match rows with their
    /// assigned counts.
    #[must_use]
    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        let total = self.total();
        let proportion = |count: u64| if total == 0 { 0.0 } else { count as f64 / total as f64 };

        let mut cumulative = 0.0;
        let mut rows = Vec::with_capacity(self.labels.len() + 2);
        for (i, label) in self.labels.iter().enumerate() {
            let hits = self.hit_anywhere(i);
            cumulative += proportion(hits);
            rows.push(SummaryRow {
                filter_id: label.clone(),
                hits,
                proportion: proportion(hits),
                cumulative,
            });
        }
        for dest in [Destination::NoMatch, Destination::MultiMatch] {
            let hits = self.assigned(dest);
            cumulative += proportion(hits);
            rows.push(SummaryRow {
                filter_id: dest.label(&self.labels).to_string(),
                hits,
                proportion: proportion(hits),
                cumulative,
            });
        }
        rows
    }

    /// Writes the summary TSV.
    pub fn write_summary(&self, path: &Path) -> Result<()> {
        DelimFile::default().write_tsv(&path.to_path_buf(), &self.summary_rows()).map_err(|e| {
            SieveError::Output { path: path.to_path_buf(), source: std::io::Error::other(e) }
        })
    }

    /// Writes the raw per-destination assignment counts TSV.
    pub fn write_counts(&self, path: &Path) -> Result<()> {
        let mut rows: Vec<CountsRow> = (0..self.labels.len())
            .map(|i| CountsRow {
                destination: self.labels[i].clone(),
                reads: self.assigned(Destination::Filter(i)),
            })
            .collect();
        for dest in [Destination::NoMatch, Destination::MultiMatch] {
            rows.push(CountsRow {
                destination: dest.label(&self.labels).to_string(),
                reads: self.assigned(dest),
            });
        }
        DelimFile::default().write_tsv(&path.to_path_buf(), &rows).map_err(|e| SieveError::Output {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })
    }
}
