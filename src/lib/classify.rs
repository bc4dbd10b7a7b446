//! Per-read classification across an ordered filter set.
//!
//! The [`Classifier`] runs the sequence evaluator against every filter (or
//! until a decision is reached) under one of four modes and produces the
//! read's hit set: the sorted filter indices that claimed it. The hit set
//! drives both the results tally and output routing downstream.

use clap::ValueEnum;
use std::sync::Arc;

use crate::bloom::FilterSet;
use crate::kmer::KmerPacker;
use crate::seq_eval::{eval_score, eval_threshold};

/// Classification mode, selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassifyMode {
    /// Include every filter whose threshold verdict is true
    Std,
    /// Include the first passing filter in declared order, then stop
    Ordered,
    /// Score all filters and include the argmax set (ties all included)
    BestHit,
    /// Score all filters and include those meeting the threshold
    Scores,
}

/// The outcome of classifying one read or pair: the hit set, plus per-filter
/// scores in the modes that compute them.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Sorted filter indices that claimed the read
    pub hits: Vec<usize>,
    /// Per-filter scores, recorded in `BestHit` and `Scores` modes
    pub scores: Option<Vec<f64>>,
}

/// Classifies reads against an ordered set of Bloom filters.
///
/// Immutable and shared by reference among worker threads; the mutable
/// per-thread state (the k-mer packer) is passed into each call.
pub struct Classifier {
    filters: Arc<FilterSet>,
    threshold: f64,
    mode: ClassifyMode,
    inclusive: bool,
}

impl Classifier {
    /// Creates a classifier.
    ///
    /// A threshold of exactly 1.0 selects `BestHit` unless an explicit mode
    /// is given: requiring every k-mer to match is almost never the intent,
    /// so the legacy surface reads it as "assign to the best filter".
    #[must_use]
    pub fn new(
        filters: Arc<FilterSet>,
        threshold: f64,
        mode: Option<ClassifyMode>,
        inclusive: bool,
    ) -> Self {
        let mode = mode.unwrap_or(if threshold == 1.0 {
            ClassifyMode::BestHit
        } else {
            ClassifyMode::Std
        });
        Self { filters, threshold, mode, inclusive }
    }

    /// The mode this classifier runs under.
    #[must_use]
    pub fn mode(&self) -> ClassifyMode {
        self.mode
    }

    /// Whether scores are recorded per read in this mode.
    #[must_use]
    pub fn records_scores(&self) -> bool {
        matches!(self.mode, ClassifyMode::BestHit | ClassifyMode::Scores)
    }

    /// Classifies a single read.
    #[must_use]
    pub fn classify(&self, seq: &[u8], packer: &mut KmerPacker) -> Verdict {
        match self.mode {
            ClassifyMode::Std => {
                let hits = (0..self.filters.len())
                    .filter(|&i| {
                        eval_threshold(seq, self.filters.get(i), self.threshold, packer)
                    })
                    .collect();
                Verdict { hits, scores: None }
            }
            ClassifyMode::Ordered => {
                let hits = (0..self.filters.len())
                    .find(|&i| eval_threshold(seq, self.filters.get(i), self.threshold, packer))
                    .into_iter()
                    .collect();
                Verdict { hits, scores: None }
            }
            ClassifyMode::BestHit => {
                let scores = self.score_all(seq, packer);
                let hits = argmax_set(&scores);
                Verdict { hits, scores: Some(scores) }
            }
            ClassifyMode::Scores => {
                let scores = self.score_all(seq, packer);
                let hits = (0..scores.len()).filter(|&i| scores[i] >= self.threshold).collect();
                Verdict { hits, scores: Some(scores) }
            }
        }
    }

    /// Classifies a read pair into a single hit set.
    ///
    /// Each filter is evaluated independently on both mates; the pair hits a
    /// filter when both mates pass it, or either mate under inclusive pair
    /// semantics. Recorded pair scores combine the mate scores with the same
    /// rule: the minimum of the two by default, the maximum when inclusive.
    #[must_use]
    pub fn classify_pair(&self, seq1: &[u8], seq2: &[u8], packer: &mut KmerPacker) -> Verdict {
        match self.mode {
            ClassifyMode::Std => {
                let hits = (0..self.filters.len())
                    .filter(|&i| self.pair_passes(seq1, seq2, i, packer))
                    .collect();
                Verdict { hits, scores: None }
            }
            ClassifyMode::Ordered => {
                let hits = (0..self.filters.len())
                    .find(|&i| self.pair_passes(seq1, seq2, i, packer))
                    .into_iter()
                    .collect();
                Verdict { hits, scores: None }
            }
            ClassifyMode::BestHit => {
                let scores1 = self.score_all(seq1, packer);
                let scores2 = self.score_all(seq2, packer);
                let best1 = argmax_set(&scores1);
                let best2 = argmax_set(&scores2);
                let hits = (0..self.filters.len())
                    .filter(|i| {
                        let in1 = best1.contains(i);
                        let in2 = best2.contains(i);
                        if self.inclusive { in1 || in2 } else { in1 && in2 }
                    })
                    .collect();
                Verdict { hits, scores: Some(self.combine_scores(&scores1, &scores2)) }
            }
            ClassifyMode::Scores => {
                let scores1 = self.score_all(seq1, packer);
                let scores2 = self.score_all(seq2, packer);
                let hits = (0..self.filters.len())
                    .filter(|&i| {
                        let p1 = scores1[i] >= self.threshold;
                        let p2 = scores2[i] >= self.threshold;
                        if self.inclusive { p1 || p2 } else { p1 && p2 }
                    })
                    .collect();
                Verdict { hits, scores: Some(self.combine_scores(&scores1, &scores2)) }
            }
        }
    }

    fn pair_passes(&self, seq1: &[u8], seq2: &[u8], i: usize, packer: &mut KmerPacker) -> bool {
        let filter = self.filters.get(i);
        if self.inclusive {
            eval_threshold(seq1, filter, self.threshold, packer)
                || eval_threshold(seq2, filter, self.threshold, packer)
        } else {
            eval_threshold(seq1, filter, self.threshold, packer)
                && eval_threshold(seq2, filter, self.threshold, packer)
        }
    }

    fn score_all(&self, seq: &[u8], packer: &mut KmerPacker) -> Vec<f64> {
        (0..self.filters.len())
            .map(|i| eval_score(seq, self.filters.get(i), packer))
            .collect()
    }

    fn combine_scores(&self, scores1: &[f64], scores2: &[f64]) -> Vec<f64> {
        scores1
            .iter()
            .zip(scores2)
            .map(|(&a, &b)| if self.inclusive { a.max(b) } else { a.min(b) })
            .collect()
    }
}

/// Indices of all entries sharing the maximum score, empty when the maximum
/// is not positive. Ties are kept so that downstream routing sends them to
/// the multi-match bin rather than picking an arbitrary winner.
fn argmax_set(scores: &[f64]) -> Vec<usize> {
    let max = scores.iter().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        (0..scores.len()).filter(|&i| scores[i] == max).collect()
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::{BloomFilter, FilterSet};

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
    fn two_filters() -> Arc<FilterSet> {
        let a = filter_over("A", b"AAAACCCC");
        let b = filter_over("B", b"GGAACTCC");
        Arc::new(FilterSet::from_filters(vec![a, b]).unwrap())
    }

    #[test]
    fn test_threshold_one_selects_best_hit() {
        let classifier = Classifier::new(two_filters(), 1.0, None, false);
        assert_eq!(classifier.mode(), ClassifyMode::BestHit);
    }

    #[test]
    fn test_explicit_mode_overrides_sentinel() {
        let classifier = Classifier::new(two_filters(), 1.0, Some(ClassifyMode::Std), false);
        assert_eq!(classifier.mode(), ClassifyMode::Std);
    }

    #[test]
    fn test_std_mode_hits_every_passing_filter() {
        let classifier = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Std), false);
        let mut packer = KmerPacker::new(K);
        assert_eq!(classifier.classify(b"AAAACCCC", &mut packer).hits, vec![0]);
        assert_eq!(classifier.classify(b"GGAACTCC", &mut packer).hits, vec![1]);
        assert_eq!(classifier.classify(b"CGTAGCTA", &mut packer).hits, Vec::<usize>::new());
    }

    #[test]
    fn test_canonicalization_matches_reverse_complement_read() {
        // GGGGTTTT is the reverse complement of AAAACCCC, so its canonical
        // 4-mers are identical and filter A claims it.
        let classifier = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Std), false);
        let mut packer = KmerPacker::new(K);
        assert_eq!(classifier.classify(b"GGGGTTTT", &mut packer).hits, vec![0]);
    }

    #[test]
    fn test_ordered_mode_stops_at_first_hit() {
        let filters = {
            let a = filter_over("A", b"AAAACCCC");
            // B also contains the AAAACCCC k-mers, plus its own
            let mut b = filter_over("B", b"GGAACTCC");
            let mut packer = KmerPacker::new(K);
            for pos in 0..=4 {
                let kmer = packer.canonical(b"AAAACCCC", pos).unwrap().to_vec();
                b.insert(&kmer);
            }
            Arc::new(FilterSet::from_filters(vec![a, b]).unwrap())
        };
        let std = Classifier::new(Arc::clone(&filters), 0.5, Some(ClassifyMode::Std), false);
        let ordered = Classifier::new(filters, 0.5, Some(ClassifyMode::Ordered), false);
        let mut packer = KmerPacker::new(K);
        assert_eq!(std.classify(b"AAAACCCC", &mut packer).hits, vec![0, 1]);
        let verdict = ordered.classify(b"AAAACCCC", &mut packer);
        assert_eq!(verdict.hits, vec![0]);
        assert!(verdict.hits.len() <= 1);
    }

    #[test]
    fn test_best_hit_includes_all_ties() {
        // AAAACCCC k-mers live in both filters: a tie at score 1.0
        let a = filter_over("A", b"AAAACCCC");
        let b = filter_over("B", b"AAAACCCC");
        let filters = Arc::new(FilterSet::from_filters(vec![a, b]).unwrap());
        let classifier = Classifier::new(filters, 1.0, None, false);
        let mut packer = KmerPacker::new(K);
        let verdict = classifier.classify(b"AAAACCCC", &mut packer);
        assert_eq!(verdict.hits, vec![0, 1]);
        let scores = verdict.scores.unwrap();
        assert_eq!(scores, vec![1.0, 1.0]);
    }

    #[test]
    fn test_best_hit_empty_when_nothing_matches() {
        let classifier = Classifier::new(two_filters(), 1.0, None, false);
        let mut packer = KmerPacker::new(K);
        let verdict = classifier.classify(b"CGTAGCTA", &mut packer);
        assert!(verdict.hits.is_empty());
    }

    #[test]
    fn test_best_hit_all_hits_share_max_score() {
        let classifier = Classifier::new(two_filters(), 1.0, None, false);
        let mut packer = KmerPacker::new(K);
        let verdict = classifier.classify(b"AAAACCCCGGAA", &mut packer);
        let scores = verdict.scores.unwrap();
        let max = scores.iter().copied().fold(0.0_f64, f64::max);
        for &i in &verdict.hits {
            assert_eq!(scores[i], max);
        }
    }

    #[test]
    fn test_scores_mode_records_all_scores() {
        let classifier = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Scores), false);
        let mut packer = KmerPacker::new(K);
        let verdict = classifier.classify(b"AAAACCCC", &mut packer);
        assert_eq!(verdict.hits, vec![0]);
        let scores = verdict.scores.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], 1.0);
    }

    #[test]
    fn test_pair_default_requires_both_mates() {
        let classifier = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Std), false);
        let mut packer = KmerPacker::new(K);
        // Mate 1 matches A, mate 2 matches nothing
        let verdict = classifier.classify_pair(b"AAAACCCC", b"CGTAGCTA", &mut packer);
        assert!(verdict.hits.is_empty());
    }

    #[test]
    fn test_pair_inclusive_accepts_either_mate() {
        let classifier = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Std), true);
        let mut packer = KmerPacker::new(K);
        let verdict = classifier.classify_pair(b"AAAACCCC", b"CGTAGCTA", &mut packer);
        assert_eq!(verdict.hits, vec![0]);
    }

    #[test]
    fn test_pair_both_mates_matching_different_filters() {
        let classifier = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Std), false);
        let mut packer = KmerPacker::new(K);
        // Mate 1 matches A only, mate 2 matches B only: no filter claims both
        let verdict = classifier.classify_pair(b"AAAACCCC", b"GGAACTCC", &mut packer);
        assert!(verdict.hits.is_empty());
        // Inclusively, both filters claim the pair
        let inclusive = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Std), true);
        let verdict = inclusive.classify_pair(b"AAAACCCC", b"GGAACTCC", &mut packer);
        assert_eq!(verdict.hits, vec![0, 1]);
    }

    #[test]
    fn test_pair_ordered_single_hit() {
        let classifier = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Ordered), true);
        let mut packer = KmerPacker::new(K);
        let verdict = classifier.classify_pair(b"AAAACCCC", b"GGAACTCC", &mut packer);
        assert_eq!(verdict.hits, vec![0]);
    }

    #[test]
    fn test_pair_best_hit_combines_argmax_sets() {
        let classifier = Classifier::new(two_filters(), 1.0, None, false);
        let mut packer = KmerPacker::new(K);
        // Both mates' best filter is A
        let verdict = classifier.classify_pair(b"AAAACCCC", b"AAAACCCC", &mut packer);
        assert_eq!(verdict.hits, vec![0]);
        // Mates disagree on the best filter: default pair semantics yield none
        let verdict = classifier.classify_pair(b"AAAACCCC", b"GGAACTCC", &mut packer);
        assert!(verdict.hits.is_empty());
    }

    #[test]
    fn test_pair_scores_combination_rule() {
        let exclusive = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Scores), false);
        let inclusive = Classifier::new(two_filters(), 0.5, Some(ClassifyMode::Scores), true);
        let mut packer = KmerPacker::new(K);
        let vex = exclusive.classify_pair(b"AAAACCCC", b"CGTAGCTA", &mut packer);
        let vin = inclusive.classify_pair(b"AAAACCCC", b"CGTAGCTA", &mut packer);
        // min rule zeroes filter A; max rule keeps mate 1's perfect score
        assert_eq!(vex.scores.unwrap()[0], 0.0);
        assert_eq!(vin.scores.unwrap()[0], 1.0);
    }
}
