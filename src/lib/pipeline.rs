//! The classification pipeline: record intake, parallel evaluation, routing.
//!
//! One machine serves every input shape. A single producer thread reads
//! records (pairing mates when the input is paired) and feeds a bounded
//! channel; a pool of workers classifies and updates the results tally; a
//! single writer thread owns the output router and the optional per-read
//! score sink. Bounded channels give natural backpressure, and putting all
//! parsing in the producer and all file output in the writer leaves the
//! workers lock-free.
//!
//! Aggregate totals are deterministic across runs; the order of records in
//! routed output files is not.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::bloom::FilterSet;
use crate::classify::{Classifier, ClassifyMode};
use crate::errors::{Result, SieveError};
use crate::kmer::KmerPacker;
use crate::output::{Mate, OutputRouter};
use crate::records::{open_record_source, ReadRecord};
use crate::results::{Destination, ResultsTally};

/// Depth of the work and result channels. Deep enough to ride out bursty
/// parsing and compression, small enough to bound memory.
const CHANNEL_CAPACITY: usize = 1024;

/// Immutable configuration for one pipeline run. Replaces the process-wide
/// option globals of older categorizers: constructed once, passed by
/// reference, never mutated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Score threshold in [0, 1]
    pub threshold: f64,
    /// Explicit mode override; `None` derives the mode from the threshold
    pub mode: Option<ClassifyMode>,
    /// Pair semantics: a filter claims a pair when either mate passes
    /// instead of requiring both
    pub inclusive: bool,
    /// Drop reads whose comment carries the platform filtered flag
    pub chastity_filter: bool,
    /// Log progress every this many reads
    pub progress_interval: u64,
    /// Worker thread count
    pub workers: usize,
    /// Route classified records to per-destination files
    pub route_reads: bool,
    /// Gzip-compress routed output
    pub gzip_output: bool,
    /// Output path prefix for the summary and routed files
    pub prefix: String,
    /// Also write raw per-destination assignment counts
    pub write_counts: bool,
    /// Also write a per-read score table (score-recording modes only)
    pub write_scores: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            mode: None,
            inclusive: false,
            chastity_filter: false,
            progress_interval: 1_000_000,
            workers: 1,
            route_reads: false,
            gzip_output: false,
            prefix: "bloomsieve".to_string(),
            write_counts: false,
            write_scores: false,
        }
    }
}

/// The input shape for one run.
pub enum InputLayout {
    /// Single-end reads from one or more files
    Single(Vec<PathBuf>),
    /// Paired reads, mates split across two files per pair
    PairedFiles(Vec<(PathBuf, PathBuf)>),
    /// Paired reads interleaved in single files, reassembled by ID
    Interleaved(Vec<PathBuf>),
}

impl InputLayout {
    fn is_paired(&self) -> bool {
        !matches!(self, InputLayout::Single(_))
    }

    fn is_empty(&self) -> bool {
        match self {
            InputLayout::Single(files) | InputLayout::Interleaved(files) => files.is_empty(),
            InputLayout::PairedFiles(pairs) => pairs.is_empty(),
        }
    }
}

/// Unit of work: one read or one reassembled pair.
enum WorkItem {
    Single(ReadRecord),
    Pair(ReadRecord, ReadRecord),
}

/// A classified unit on its way to the writer.
struct RoutedItem {
    dest: Destination,
    item: WorkItem,
    scores: Option<Vec<f64>>,
}

/// Intake bookkeeping, owned by the single producer thread: units fed to
/// the workers plus the reads dropped or orphaned on the way in. Logs a
/// reading-progress line each time the fed count crosses the configured
/// interval. Plain counters suffice because only the producer touches them.
#[derive(Debug)]
struct IntakeProgress {
    interval: u64,
    fed: u64,
    orphaned: u64,
    unchaste: u64,
}

impl IntakeProgress {
    fn new(interval: u64) -> Self {
        Self { interval: interval.max(1), fed: 0, orphaned: 0, unchaste: 0 }
    }

    /// Counts one read (or pair) handed to the workers.
    fn fed_one(&mut self) {
        self.fed += 1;
        if self.fed % self.interval == 0 {
            info!("Currently reading read number: {}", self.fed);
        }
    }

    /// Counts a read discarded by the chastity gate.
    fn dropped_unchaste(&mut self) {
        self.unchaste += 1;
    }

    /// Counts interleaved reads left without a partner at end of stream.
    fn add_orphans(&mut self, count: u64) {
        self.orphaned += count;
    }
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    /// Reads (or pairs) classified
    pub total_reads: u64,
    /// Interleaved reads that never found a partner; counted, not classified
    pub orphaned_reads: u64,
    /// Reads dropped by the chastity filter
    pub unchaste_reads: u64,
    /// Path of the summary TSV written at the end of the run
    pub summary_path: PathBuf,
}

/// Runs the full pipeline over `input` and writes the summary on completion.
pub fn run(config: &RunConfig, filters: FilterSet, input: InputLayout) -> Result<RunSummary> {
    if input.is_empty() {
        return Err(SieveError::InvalidParameter {
            parameter: "inputs".to_string(),
            reason: "at least one input file is required".to_string(),
        });
    }
    let workers = config.workers.max(1);
    let paired = input.is_paired();

    let labels = filters.labels();
    let kmer_size = filters.kmer_size();
    let tally = Arc::new(ResultsTally::new(labels.clone()));
    let classifier =
        Arc::new(Classifier::new(Arc::new(filters), config.threshold, config.mode, config.inclusive));

    let want_writer = config.route_reads || (config.write_scores && classifier.records_scores());

    let (work_tx, work_rx) = bounded::<WorkItem>(CHANNEL_CAPACITY);
    let (result_tx, result_rx) = if want_writer {
        let (tx, rx) = bounded::<RoutedItem>(CHANNEL_CAPACITY);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let producer: JoinHandle<Result<IntakeProgress>> = {
        let chastity = config.chastity_filter;
        let interval = config.progress_interval;
        thread::spawn(move || produce(input, chastity, interval, &work_tx))
    };

    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = work_rx.clone();
        let tx = result_tx.clone();
        let classifier = Arc::clone(&classifier);
        let tally = Arc::clone(&tally);
        worker_handles.push(thread::spawn(move || {
            let mut packer = KmerPacker::new(kmer_size);
            while let Ok(item) = rx.recv() {
                let verdict = match &item {
                    WorkItem::Single(rec) => classifier.classify(&rec.seq, &mut packer),
                    WorkItem::Pair(rec1, rec2) => {
                        classifier.classify_pair(&rec1.seq, &rec2.seq, &mut packer)
                    }
                };
                let dest = tally.record(&verdict.hits);
                if let Some(tx) = &tx {
                    // The writer dropping its receiver means it failed; its
                    // error surfaces at join, so just stop forwarding.
                    if tx.send(RoutedItem { dest, item, scores: verdict.scores }).is_err() {
                        break;
                    }
                }
            }
        }));
    }
    drop(work_rx);
    drop(result_tx);

    let writer: Option<JoinHandle<Result<()>>> = result_rx.map(|rx| {
        let settings = WriterSettings {
            prefix: config.prefix.clone(),
            labels: labels.clone(),
            paired,
            route_reads: config.route_reads,
            gzip: config.gzip_output,
            write_scores: config.write_scores && classifier.records_scores(),
        };
        thread::spawn(move || write_results(&rx, &settings))
    });

    let intake = producer
        .join()
        .map_err(|_| SieveError::ThreadPanic { stage: "record intake".to_string() })?;
    for handle in worker_handles {
        handle
            .join()
            .map_err(|_| SieveError::ThreadPanic { stage: "classification".to_string() })?;
    }
    let writer_result = match writer {
        Some(handle) => handle
            .join()
            .map_err(|_| SieveError::ThreadPanic { stage: "output routing".to_string() })?,
        None => Ok(()),
    };
    let intake = intake?;
    writer_result?;

    if intake.orphaned > 0 {
        warn!(
            "{} interleaved reads never found a partner and were not classified",
            intake.orphaned
        );
    }

    let summary_path = PathBuf::from(format!("{}_summary.tsv", config.prefix));
    info!("Writing file: {}", summary_path.display());
    tally.write_summary(&summary_path)?;
    if config.write_counts {
        let counts_path = PathBuf::from(format!("{}_counts.tsv", config.prefix));
        info!("Writing file: {}", counts_path.display());
        tally.write_counts(&counts_path)?;
    }
    info!("Total reads: {}", tally.total());

    Ok(RunSummary {
        total_reads: tally.total(),
        orphaned_reads: intake.orphaned,
        unchaste_reads: intake.unchaste,
        summary_path,
    })
}

/// Reads every input record, applies the chastity gate, reassembles pairs
/// where the layout calls for it, and feeds the work channel. Returning
/// early on a closed channel is not an error: it means the downstream ended
/// first and its error will surface at join.
fn produce(
    input: InputLayout,
    chastity: bool,
    progress_interval: u64,
    tx: &Sender<WorkItem>,
) -> Result<IntakeProgress> {
    let mut stats = IntakeProgress::new(progress_interval);
    match input {
        InputLayout::Single(files) => {
            for path in files {
                let mut source = open_record_source(&path)?;
                while let Some(rec) = source.next_record()? {
                    if chastity && !rec.is_chaste() {
                        stats.dropped_unchaste();
                        continue;
                    }
                    stats.fed_one();
                    if tx.send(WorkItem::Single(rec)).is_err() {
                        return Ok(stats);
                    }
                }
            }
        }
        InputLayout::PairedFiles(pairs) => {
            for (path1, path2) in pairs {
                let mut source1 = open_record_source(&path1)?;
                let mut source2 = open_record_source(&path2)?;
                loop {
                    match (source1.next_record()?, source2.next_record()?) {
                        (Some(rec1), Some(rec2)) => {
                            if chastity && (!rec1.is_chaste() || !rec2.is_chaste()) {
                                // The pair is dropped whole; both reads count
                                stats.dropped_unchaste();
                                stats.dropped_unchaste();
                                continue;
                            }
                            stats.fed_one();
                            if tx.send(WorkItem::Pair(rec1, rec2)).is_err() {
                                return Ok(stats);
                            }
                        }
                        (None, None) => break,
                        (Some(rec), None) => {
                            return Err(SieveError::InputFile {
                                path: path2.clone(),
                                reason: format!(
                                    "ended before its mate file; read '{}' has no partner",
                                    rec.id
                                ),
                            });
                        }
                        (None, Some(rec)) => {
                            return Err(SieveError::InputFile {
                                path: path1.clone(),
                                reason: format!(
                                    "ended before its mate file; read '{}' has no partner",
                                    rec.id
                                ),
                            });
                        }
                    }
                }
            }
        }
        InputLayout::Interleaved(files) => {
            for path in files {
                let mut source = open_record_source(&path)?;
                // Held first-arrivals keyed by read ID with the two-character
                // mate suffix stripped; the partner's arrival releases the pair.
                let mut held: HashMap<String, ReadRecord> = HashMap::new();
                while let Some(rec) = source.next_record()? {
                    if chastity && !rec.is_chaste() {
                        stats.dropped_unchaste();
                        continue;
                    }
                    let key = rec.pair_key().to_string();
                    match held.remove(&key) {
                        None => {
                            held.insert(key, rec);
                        }
                        Some(partner) => {
                            let (rec1, rec2) = if rec.is_first_mate() {
                                (rec, partner)
                            } else {
                                (partner, rec)
                            };
                            stats.fed_one();
                            if tx.send(WorkItem::Pair(rec1, rec2)).is_err() {
                                return Ok(stats);
                            }
                        }
                    }
                }
                // A non-empty table at end of stream means orphaned reads
                stats.add_orphans(held.len() as u64);
            }
        }
    }
    Ok(stats)
}

struct WriterSettings {
    prefix: String,
    labels: Vec<String>,
    paired: bool,
    route_reads: bool,
    gzip: bool,
    write_scores: bool,
}

/// Drains classified records: appends each to its destination bin and, when
/// enabled, streams per-read scores. The router is created on the first
/// record so the output extension can follow whether the input carried
/// qualities.
fn write_results(rx: &Receiver<RoutedItem>, settings: &WriterSettings) -> Result<()> {
    let mut router: Option<OutputRouter> = None;
    let mut score_sink = if settings.write_scores {
        let path = PathBuf::from(format!("{}_scores.tsv", settings.prefix));
        let file = File::create(&path)
            .map_err(|e| SieveError::Output { path: path.clone(), source: e })?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "read_id\tfilter_id\tscore")
            .map_err(|e| SieveError::Output { path: path.clone(), source: e })?;
        Some((path, writer))
    } else {
        None
    };

    while let Ok(routed) = rx.recv() {
        let (first, second) = match &routed.item {
            WorkItem::Single(rec) => (rec, None),
            WorkItem::Pair(rec1, rec2) => (rec1, Some(rec2)),
        };

        if settings.route_reads {
            if router.is_none() {
                router = Some(OutputRouter::new(
                    &settings.prefix,
                    &settings.labels,
                    settings.paired,
                    first.is_fastq(),
                    settings.gzip,
                )?);
            }
            let router = router.as_mut().expect("router was created above");
            match second {
                None => router.write(routed.dest, Mate::Single, first)?,
                Some(rec2) => {
                    router.write(routed.dest, Mate::First, first)?;
                    router.write(routed.dest, Mate::Second, rec2)?;
                }
            }
        }

        if let Some((path, writer)) = score_sink.as_mut() {
            if let Some(scores) = &routed.scores {
                for (label, score) in settings.labels.iter().zip(scores) {
                    writeln!(writer, "{}\t{label}\t{score}", first.id)
                        .map_err(|e| SieveError::Output { path: path.clone(), source: e })?;
                }
            }
        }
    }

    // Bin files exist even for an empty run; defaults to FASTA naming when
    // no record ever arrived to decide the extension.
    if settings.route_reads && router.is_none() {
        router = Some(OutputRouter::new(
            &settings.prefix,
            &settings.labels,
            settings.paired,
            false,
            settings.gzip,
        )?);
    }
    if let Some(router) = router {
        router.finish()?;
    }
    if let Some((path, mut writer)) = score_sink {
        writer.flush().map_err(|e| SieveError::Output { path, source: e })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::BloomFilter;
    use tempfile::TempDir;

    const K: usize = 4;

    fn filter_over(id: &str, seq: &[u8]) -> BloomFilter {
        let mut filter = BloomFilter::with_params(id, 1 << 16, 3, K as u32);
        let mut packer = KmerPacker::new(K);
        for pos in 0..=(seq.len() - K) {
            let kmer = packer.canonical(seq, pos).unwrap().to_vec();
            filter.insert(&kmer);
        }
        filter
    }

    /// Filters A (4-mers of AAAACCCC) and B (4-mers of GGAACTCC).
    fn filters() -> FilterSet {
        FilterSet::from_filters(vec![
            filter_over("A", b"AAAACCCC"),
            filter_over("B", b"GGAACTCC"),
        ])
        .unwrap()
    }

    fn write_fastq(dir: &TempDir, name: &str, reads: &[(&str, &str)]) -> PathBuf {
        let mut text = String::new();
        for (id, seq) in reads {
            text.push_str(&format!("@{id}\n{seq}\n+\n{}\n", "I".repeat(seq.len())));
        }
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn config(dir: &TempDir) -> RunConfig {
        RunConfig {
            threshold: 0.5,
            workers: 4,
            prefix: dir.path().join("run").to_string_lossy().to_string(),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_intake_progress_counters() {
        let mut progress = IntakeProgress::new(0); // interval clamps to 1
        progress.fed_one();
        progress.fed_one();
        progress.dropped_unchaste();
        progress.add_orphans(3);
        assert_eq!(progress.fed, 2);
        assert_eq!(progress.unchaste, 1);
        assert_eq!(progress.orphaned, 3);
    }

    #[test]
    fn test_single_end_run_totals() {
        let dir = TempDir::new().unwrap();
        let input = write_fastq(
            &dir,
            "in.fq",
            &[
                ("r1", "AAAACCCC"),   // A
                ("r2", "GGGGTTTT"),   // revcomp of AAAACCCC -> A
                ("r3", "CGTAGCTA"),   // no match
                ("r4", "GGAACTCC"),   // B
            ],
        );
        let summary =
            run(&config(&dir), filters(), InputLayout::Single(vec![input])).unwrap();
        assert_eq!(summary.total_reads, 4);
        assert_eq!(summary.orphaned_reads, 0);

        let text = std::fs::read_to_string(&summary.summary_path).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows[0], "filter_id\thits\tproportion\tcumulative");
        assert!(rows[1].starts_with("A\t2\t"));
        assert!(rows[2].starts_with("B\t1\t"));
        assert!(rows[3].starts_with("noMatch\t1\t"));
        assert!(rows[4].starts_with("multiMatch\t0\t"));
    }

    #[test]
    fn test_routing_writes_bin_files() {
        let dir = TempDir::new().unwrap();
        let input = write_fastq(
            &dir,
            "in.fq",
            &[("r1", "AAAACCCC"), ("r2", "CGTAGCTA"), ("r3", "AAAACCCCGGAACTCC")],
        );
        let mut cfg = config(&dir);
        cfg.route_reads = true;
        cfg.threshold = 0.3;
        run(&cfg, filters(), InputLayout::Single(vec![input])).unwrap();

        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert!(read("run_A.fq").contains("@r1"));
        assert!(read("run_noMatch.fq").contains("@r2"));
        // r3 carries enough of both references to pass the threshold for each
        assert!(read("run_multiMatch.fq").contains("@r3"));
        assert_eq!(read("run_B.fq"), "");
    }

    #[test]
    fn test_paired_files_default_semantics() {
        let dir = TempDir::new().unwrap();
        let mate1 = write_fastq(&dir, "r1.fq", &[("p1/1", "AAAACCCC"), ("p2/1", "AAAACCCC")]);
        let mate2 = write_fastq(&dir, "r2.fq", &[("p1/2", "AAAACCCC"), ("p2/2", "CGTAGCTA")]);
        let summary = run(
            &config(&dir),
            filters(),
            InputLayout::PairedFiles(vec![(mate1, mate2)]),
        )
        .unwrap();
        assert_eq!(summary.total_reads, 2);

        let text = std::fs::read_to_string(&summary.summary_path).unwrap();
        // p1 hits A on both mates; p2's second mate misses, so the pair is unmatched
        assert!(text.lines().nth(1).unwrap().starts_with("A\t1\t"));
        assert!(text.lines().nth(3).unwrap().starts_with("noMatch\t1\t"));
    }

    #[test]
    fn test_paired_inclusive_accepts_either_mate() {
        let dir = TempDir::new().unwrap();
        let mate1 = write_fastq(&dir, "r1.fq", &[("p1/1", "AAAACCCC")]);
        let mate2 = write_fastq(&dir, "r2.fq", &[("p1/2", "CGTAGCTA")]);
        let mut cfg = config(&dir);
        cfg.inclusive = true;
        let summary =
            run(&cfg, filters(), InputLayout::PairedFiles(vec![(mate1, mate2)])).unwrap();
        assert_eq!(summary.total_reads, 1);
        let text = std::fs::read_to_string(&summary.summary_path).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("A\t1\t"));
    }

    #[test]
    fn test_paired_files_length_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mate1 = write_fastq(&dir, "r1.fq", &[("p1/1", "AAAACCCC"), ("p2/1", "AAAACCCC")]);
        let mate2 = write_fastq(&dir, "r2.fq", &[("p1/2", "AAAACCCC")]);
        let err = run(
            &config(&dir),
            filters(),
            InputLayout::PairedFiles(vec![(mate1, mate2)]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no partner"));
    }

    #[test]
    fn test_interleaved_reassembly_and_orphans() {
        let dir = TempDir::new().unwrap();
        // Pairs arrive out of order; lone/1 never finds a partner
        let input = write_fastq(
            &dir,
            "in.fq",
            &[
                ("p1/1", "AAAACCCC"),
                ("p2/2", "CGTAGCTA"),
                ("p2/1", "CGTAGCTA"),
                ("lone/1", "AAAACCCC"),
                ("p1/2", "AAAACCCC"),
            ],
        );
        let summary =
            run(&config(&dir), filters(), InputLayout::Interleaved(vec![input])).unwrap();
        assert_eq!(summary.total_reads, 2);
        assert_eq!(summary.orphaned_reads, 1);
    }

    #[test]
    fn test_chastity_filter_drops_flagged_reads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.fq");
        std::fs::write(
            &path,
            "@r1 1:N:0:ATCACG\nAAAACCCC\n+\nIIIIIIII\n@r2 1:Y:0:ATCACG\nAAAACCCC\n+\nIIIIIIII\n",
        )
        .unwrap();
        let mut cfg = config(&dir);
        cfg.chastity_filter = true;
        let summary = run(&cfg, filters(), InputLayout::Single(vec![path])).unwrap();
        assert_eq!(summary.total_reads, 1);
        assert_eq!(summary.unchaste_reads, 1);
    }

    #[test]
    fn test_zero_inputs_rejected() {
        let dir = TempDir::new().unwrap();
        let err = run(&config(&dir), filters(), InputLayout::Single(vec![])).unwrap_err();
        assert!(matches!(err, SieveError::InvalidParameter { .. }));
    }

    #[test]
    fn test_totals_deterministic_across_worker_counts() {
        let dir = TempDir::new().unwrap();
        let reads: Vec<(String, &str)> = (0..200)
            .map(|i| {
                let seq = match i % 3 {
                    0 => "AAAACCCC",
                    1 => "GGAACTCC",
                    _ => "CGTAGCTA",
                };
                (format!("r{i}"), seq)
            })
            .collect();
        let reads_ref: Vec<(&str, &str)> =
            reads.iter().map(|(id, seq)| (id.as_str(), *seq)).collect();
        let input = write_fastq(&dir, "in.fq", &reads_ref);

        let mut texts = Vec::new();
        for workers in [1, 4] {
            let sub = TempDir::new().unwrap();
            let mut cfg = config(&sub);
            cfg.workers = workers;
            let summary =
                run(&cfg, filters(), InputLayout::Single(vec![input.clone()])).unwrap();
            assert_eq!(summary.total_reads, 200);
            texts.push(std::fs::read_to_string(&summary.summary_path).unwrap());
        }
        assert_eq!(texts[0], texts[1]);
    }

    #[test]
    fn test_scores_output_in_scores_mode() {
        let dir = TempDir::new().unwrap();
        let input = write_fastq(&dir, "in.fq", &[("r1", "AAAACCCC")]);
        let mut cfg = config(&dir);
        cfg.mode = Some(ClassifyMode::Scores);
        cfg.write_scores = true;
        run(&cfg, filters(), InputLayout::Single(vec![input])).unwrap();

        let text = std::fs::read_to_string(dir.path().join("run_scores.tsv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("read_id\tfilter_id\tscore"));
        assert_eq!(lines.next(), Some("r1\tA\t1"));
    }
}
