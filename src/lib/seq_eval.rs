//! Per-read scoring against a single Bloom filter.
//!
//! A read's score for a filter is the fraction of its extractable canonical
//! k-mers (windows free of non-ACGT bases) that the filter claims. Two
//! entry points cover the two call sites: [`eval_threshold`] answers a
//! yes/no question and stops scanning as soon as the answer is locked in,
//! while [`eval_score`] always walks the whole read to produce the exact
//! ratio for score-reporting modes.

use crate::bloom::BloomFilter;
use crate::kmer::KmerPacker;

/// Streaming threshold verdict with early exit.
///
/// Let `T = len - k + 1`, the window count and an upper bound on the number
/// of extractable k-mers (windows rejected for non-ACGT bases shrink the
/// true denominator but not this bound). Scanning left to right:
///
/// - accept as soon as `matched / T >= threshold` with at least one match,
///   since the final ratio can only be larger;
/// - reject as soon as even matching every remaining window could not reach
///   the threshold, i.e. `(T - extractable + matched) / T < threshold`;
/// - otherwise the verdict after the last window is
///   `matched / extractable >= threshold` over the windows actually seen.
///
/// A threshold of 0.0 means any single hit accepts; a read with no matching
/// k-mer is never accepted at any threshold. Reads shorter than `k` have no
/// windows and always fail.
#[must_use]
pub fn eval_threshold(
    seq: &[u8],
    filter: &BloomFilter,
    threshold: f64,
    packer: &mut KmerPacker,
) -> bool {
    let k = packer.kmer_size();
    if seq.len() < k {
        return false;
    }
    let windows = seq.len() - k + 1;
    let bound = windows as f64;

    let mut matched = 0usize;
    let mut extractable = 0usize;
    for pos in 0..windows {
        if let Some(kmer) = packer.canonical(seq, pos) {
            extractable += 1;
            if filter.contains(kmer) {
                matched += 1;
                if matched as f64 / bound >= threshold {
                    return true;
                }
            }
        }
        // Upper bound on the final score: every window not yet seen as
        // extractable could still match without growing the denominator
        // past T. Unextractable windows must not count as misses here, or
        // reads whose denominator shrinks (e.g. one good window among Ns)
        // would be rejected before their score is known.
        if ((windows - extractable + matched) as f64) / bound < threshold {
            return false;
        }
    }
    extractable > 0 && matched > 0 && matched as f64 / extractable as f64 >= threshold
}

/// Exact score without early exit: matching k-mers over extractable k-mers,
/// or 0.0 when the read has none (shorter than `k`, or every window holds a
/// non-ACGT base).
#[must_use]
pub fn eval_score(seq: &[u8], filter: &BloomFilter, packer: &mut KmerPacker) -> f64 {
    let k = packer.kmer_size();
    if seq.len() < k {
        return 0.0;
    }
    let mut matched = 0usize;
    let mut extractable = 0usize;
    for pos in 0..=(seq.len() - k) {
        if let Some(kmer) = packer.canonical(seq, pos) {
            extractable += 1;
            if filter.contains(kmer) {
                matched += 1;
            }
        }
    }
    if extractable == 0 { 0.0 } else { matched as f64 / extractable as f64 }
}
