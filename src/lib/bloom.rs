//! Bloom filter membership testing and filter loading.
//!
//! A [`BloomFilter`] is a fixed bit array with `num_hash` positions derived
//! per key from seeded MurmurHash64A over the packed bytes of a canonical
//! k-mer. Lookups have no false negatives and false positives at the rate
//! the filter was built for. Filters are immutable for the classifier's
//! lifetime and shared read-only across worker threads.
//!
//! On disk a filter is a pair of files: `name.bf` holding the raw bit array
//! and a sidecar `name.txt` (the `.bf` suffix replaced by `txt`) holding the
//! filter's parameters as a single-row TSV. The sidecar is required; a `.bf`
//! without one cannot be interpreted.

use fgoxide::io::DelimFile;
use log::info;
use murmurhash64::murmur_hash64a;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SieveError};

/// The hash family this build derives bit positions with. The sidecar of
/// every loaded filter must name the same family or the load fails.
pub const HASH_FAMILY: &str = "murmur64a";

/// Parameters of a Bloom filter, stored in its sidecar info file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterInfo {
    /// Label used for output bins and the summary
    pub filter_id: String,
    /// Window size the filter was built over
    pub kmer_size: u32,
    /// Number of hash-derived bit positions per key
    pub num_hash: u32,
    /// Size of the bit array in bits
    pub size_bits: u64,
    /// Number of distinct k-mers inserted at build time
    pub num_entries: u64,
    /// False-positive rate the filter was sized for
    pub fpr: f64,
    /// Hash family used to derive bit positions
    pub hash_family: String,
}

/// A loaded Bloom filter: bit array plus its sidecar parameters.
#[derive(Debug)]
pub struct BloomFilter {
    bits: Vec<u8>,
    info: FilterInfo,
}

impl BloomFilter {
    /// Creates an empty filter for construction (the builder ecosystem and
    /// tests). Classification only ever loads pre-built filters.
    #[must_use]
    pub fn with_params(filter_id: &str, size_bits: u64, num_hash: u32, kmer_size: u32) -> Self {
        let bytes = usize::try_from(size_bits.div_ceil(8)).expect("filter size exceeds memory");
        Self {
            bits: vec![0; bytes],
            info: FilterInfo {
                filter_id: filter_id.to_string(),
                kmer_size,
                num_hash,
                size_bits,
                num_entries: 0,
                fpr: 0.0,
                hash_family: HASH_FAMILY.to_string(),
            },
        }
    }

    /// Loads a filter from `path` (`.bf` bit array) and its sidecar.
    pub fn load(path: &Path) -> Result<Self> {
        let info_path = sidecar_path(path);
        if !info_path.exists() {
            return Err(SieveError::FilterLoad {
                path: path.to_path_buf(),
                reason: format!(
                    "sidecar info file '{}' is missing; it is required to interpret the filter",
                    info_path.display()
                ),
            });
        }
        let rows: Vec<FilterInfo> =
            DelimFile::default().read_tsv(&info_path).map_err(|e| SieveError::FilterLoad {
                path: path.to_path_buf(),
                reason: format!("cannot parse sidecar '{}': {e}", info_path.display()),
            })?;
        let info = match rows.as_slice() {
            [only] => only.clone(),
            other => {
                return Err(SieveError::FilterLoad {
                    path: path.to_path_buf(),
                    reason: format!(
                        "sidecar '{}' must contain exactly one row, found {}",
                        info_path.display(),
                        other.len()
                    ),
                });
            }
        };

        if info.hash_family != HASH_FAMILY {
            return Err(SieveError::HashFamilyMismatch {
                family: info.hash_family,
                expected: HASH_FAMILY.to_string(),
                filter: info.filter_id,
            });
        }
        if info.kmer_size < 4 {
            return Err(SieveError::FilterLoad {
                path: path.to_path_buf(),
                reason: format!("k-mer size {} is below the minimum of 4", info.kmer_size),
            });
        }
        if info.num_hash == 0 || info.size_bits == 0 {
            return Err(SieveError::FilterLoad {
                path: path.to_path_buf(),
                reason: "filter must have a non-zero bit count and hash count".to_string(),
            });
        }

        let bits = fs::read(path).map_err(|e| SieveError::FilterLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let expected_len = info.size_bits.div_ceil(8);
        if bits.len() as u64 != expected_len {
            return Err(SieveError::FilterLoad {
                path: path.to_path_buf(),
                reason: format!(
                    "bit array is {} bytes but the sidecar declares {} bits ({} bytes)",
                    bits.len(),
                    info.size_bits,
                    expected_len
                ),
            });
        }

        Ok(Self { bits, info })
    }

    /// Writes the bit array to `path` and the sidecar next to it.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.bits)
            .map_err(|e| SieveError::Output { path: path.to_path_buf(), source: e })?;
        let info_path = sidecar_path(path);
        DelimFile::default()
            .write_tsv(&info_path, std::slice::from_ref(&self.info))
            .map_err(|e| SieveError::Output {
                path: info_path.clone(),
                source: std::io::Error::other(e),
            })?;
        Ok(())
    }

    /// Returns true iff every hash-derived position for `kmer` is set.
    #[inline]
    #[must_use]
    pub fn contains(&self, kmer: &[u8]) -> bool {
        for seed in 0..u64::from(self.info.num_hash) {
            let bit = murmur_hash64a(kmer, seed) % self.info.size_bits;
            if self.bits[(bit / 8) as usize] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    /// Sets every hash-derived position for `kmer`. Build-time only; never
    /// called during classification.
    pub fn insert(&mut self, kmer: &[u8]) {
        for seed in 0..u64::from(self.info.num_hash) {
            let bit = murmur_hash64a(kmer, seed) % self.info.size_bits;
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
        self.info.num_entries += 1;
        self.info.fpr = self.estimated_fpr();
    }

    /// Estimated false-positive rate `(1 - e^(-h*n/m))^h` for the current
    /// entry count.
    #[must_use]
    pub fn estimated_fpr(&self) -> f64 {
        let h = f64::from(self.info.num_hash);
        let n = self.info.num_entries as f64;
        let m = self.info.size_bits as f64;
        (1.0 - (-h * n / m).exp()).powf(h)
    }

    /// The filter's label.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.filter_id
    }

    /// Window size the filter was built over.
    #[must_use]
    pub fn kmer_size(&self) -> u32 {
        self.info.kmer_size
    }

    /// The filter's full parameter set.
    #[must_use]
    pub fn info(&self) -> &FilterInfo {
        &self.info
    }
}

/// Path of the sidecar info file: the last two characters of the filter
/// path (the `bf` of `.bf`) replaced with `txt`.
#[must_use]
pub fn sidecar_path(filter_path: &Path) -> PathBuf {
    let s = filter_path.to_string_lossy();
    let stem = if s.len() >= 2 { &s[..s.len() - 2] } else { s.as_ref() };
    PathBuf::from(format!("{stem}txt"))
}

/// Reads only the sidecar parameters for a filter path, without touching the
/// bit array. Used by `info` to report on filters cheaply.
pub fn load_info(filter_path: &Path) -> Result<FilterInfo> {
    let info_path = sidecar_path(filter_path);
    let rows: Vec<FilterInfo> =
        DelimFile::default().read_tsv(&info_path).map_err(|e| SieveError::FilterLoad {
            path: filter_path.to_path_buf(),
            reason: format!("cannot read sidecar '{}': {e}", info_path.display()),
        })?;
    rows.into_iter().next().ok_or_else(|| SieveError::FilterLoad {
        path: filter_path.to_path_buf(),
        reason: "sidecar is empty".to_string(),
    })
}

/// An ordered set of filters sharing a single k-mer size. Index `i` in the
/// set identifies filter `i` everywhere downstream: hit sets, the results
/// tally and the output router.
#[derive(Debug)]
pub struct FilterSet {
    filters: Vec<BloomFilter>,
}

impl FilterSet {
    /// Loads filters in the order given and verifies they agree on `k`.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        if paths.is_empty() {
            return Err(SieveError::InvalidParameter {
                parameter: "filters".to_string(),
                reason: "at least one filter is required".to_string(),
            });
        }
        let mut filters: Vec<BloomFilter> = Vec::with_capacity(paths.len());
        for path in paths {
            let filter = BloomFilter::load(path)?;
            if let Some(first) = filters.first() {
                if filter.kmer_size() != first.kmer_size() {
                    return Err(SieveError::KmerSizeMismatch {
                        expected: first.kmer_size(),
                        found: filter.kmer_size(),
                        filter: filter.id().to_string(),
                    });
                }
            }
            info!("Loaded filter: {} (k={}, {} hashes)", filter.id(), filter.kmer_size(), filter.info().num_hash);
            filters.push(filter);
        }
        Ok(Self { filters })
    }

    /// Wraps already-built filters; used by tests and the builder ecosystem.
    /// The same single-`k` rule applies.
    pub fn from_filters(filters: Vec<BloomFilter>) -> Result<Self> {
        if filters.is_empty() {
            return Err(SieveError::InvalidParameter {
                parameter: "filters".to_string(),
                reason: "at least one filter is required".to_string(),
            });
        }
        let k = filters[0].kmer_size();
        if let Some(bad) = filters.iter().find(|f| f.kmer_size() != k) {
            return Err(SieveError::KmerSizeMismatch {
                expected: k,
                found: bad.kmer_size(),
                filter: bad.id().to_string(),
            });
        }
        Ok(Self { filters })
    }

    /// Number of filters in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// True when the set holds no filters (never constructed this way).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// The shared k-mer size.
    #[must_use]
    pub fn kmer_size(&self) -> usize {
        self.filters[0].kmer_size() as usize
    }

    /// Filter labels in declared order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.id().to_string()).collect()
    }

    /// The filter at index `i`.
    #[must_use]
    pub fn get(&self, i: usize) -> &BloomFilter {
        &self.filters[i]
    }

    /// Iterates filters in declared order.
    pub fn iter(&self) -> std::slice::Iter<'_, BloomFilter> {
        self.filters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::KmerPacker;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    fn insert_all_kmers(filter: &mut BloomFilter, seq: &[u8], k: usize) {
        let mut packer = KmerPacker::new(k);
        for pos in 0..=(seq.len() - k) {
            let kmer = packer.canonical(seq, pos).unwrap().to_vec();
            filter.insert(&kmer);
        }
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::with_params("test", 4096, 3, 4);
        let mut packer = KmerPacker::new(4);
        insert_all_kmers(&mut filter, b"AAAACCCC", 4);
        for pos in 0..=4 {
            let kmer = packer.canonical(b"AAAACCCC", pos).unwrap().to_vec();
            assert!(filter.contains(&kmer), "inserted k-mer missing at pos {pos}");
        }
    }

    #[test]
    fn test_canonical_lookup_matches_reverse_complement() {
        let mut filter = BloomFilter::with_params("test", 4096, 3, 4);
        insert_all_kmers(&mut filter, b"AAAACCCC", 4);
        // GGGGTTTT is the reverse complement; its canonical k-mers are the same
        let mut packer = KmerPacker::new(4);
        for pos in 0..=4 {
            let kmer = packer.canonical(b"GGGGTTTT", pos).unwrap().to_vec();
            assert!(filter.contains(&kmer));
        }
    }

    #[test]
    fn test_false_positive_rate_near_target() {
        // ~9.6 bits per entry with 3 hashes gives an FPR of a few percent;
        // check empirically against random absent keys.
        let mut filter = BloomFilter::with_params("fpr", 1 << 16, 3, 16);
        let mut rng = StdRng::seed_from_u64(42);
        let mut inserted = std::collections::HashSet::new();
        while inserted.len() < 4096 {
            let key: [u8; 4] = rng.gen();
            if inserted.insert(key) {
                filter.insert(&key);
            }
        }
        let expected = filter.estimated_fpr();
        let trials = 20_000;
        let mut false_hits = 0u32;
        for _ in 0..trials {
            let key: [u8; 4] = rng.gen();
            if !inserted.contains(&key) && filter.contains(&key) {
                false_hits += 1;
            }
        }
        let observed = f64::from(false_hits) / f64::from(trials);
        assert!(
            observed < expected * 2.0 + 0.01,
            "observed FPR {observed} far above expected {expected}"
        );
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.bf");
        let mut filter = BloomFilter::with_params("sample", 2048, 4, 8);
        filter.insert(b"\x01\x02");
        filter.insert(b"\xAA\xBB");
        filter.save(&path).unwrap();

        assert!(sidecar_path(&path).ends_with("sample.txt"));
        let loaded = BloomFilter::load(&path).unwrap();
        assert_eq!(loaded.id(), "sample");
        assert_eq!(loaded.kmer_size(), 8);
        assert_eq!(loaded.info().num_entries, 2);
        assert!(loaded.contains(b"\x01\x02"));
        assert!(loaded.contains(b"\xAA\xBB"));
    }

    #[test]
    fn test_missing_sidecar_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orphan.bf");
        std::fs::write(&path, vec![0u8; 16]).unwrap();
        let err = BloomFilter::load(&path).unwrap_err();
        assert!(err.to_string().contains("sidecar"));
    }

    #[test]
    fn test_size_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bf");
        let filter = BloomFilter::with_params("short", 2048, 3, 8);
        filter.save(&path).unwrap();
        // Truncate the bit array so it no longer matches the sidecar
        std::fs::write(&path, vec![0u8; 4]).unwrap();
        let err = BloomFilter::load(&path).unwrap_err();
        assert!(err.to_string().contains("sidecar declares"));
    }

    #[test]
    fn test_wrong_hash_family_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign.bf");
        let mut filter = BloomFilter::with_params("foreign", 256, 2, 8);
        filter.info.hash_family = "cityhash".to_string();
        filter.save(&path).unwrap();
        let err = BloomFilter::load(&path).unwrap_err();
        assert!(matches!(err, SieveError::HashFamilyMismatch { .. }));
    }

    #[test]
    fn test_filter_set_rejects_mixed_k() {
        let a = BloomFilter::with_params("a", 256, 2, 8);
        let b = BloomFilter::with_params("b", 256, 2, 12);
        let err = FilterSet::from_filters(vec![a, b]).unwrap_err();
        assert!(matches!(err, SieveError::KmerSizeMismatch { expected: 8, found: 12, .. }));
    }

    #[test]
    fn test_filter_set_labels_in_order() {
        let a = BloomFilter::with_params("alpha", 256, 2, 8);
        let b = BloomFilter::with_params("beta", 256, 2, 8);
        let set = FilterSet::from_filters(vec![a, b]).unwrap();
        assert_eq!(set.labels(), vec!["alpha", "beta"]);
        assert_eq!(set.kmer_size(), 8);
        assert_eq!(set.len(), 2);
    }
}
