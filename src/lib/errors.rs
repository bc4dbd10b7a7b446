//! Custom error types for bloomsieve operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bloomsieve operations
pub type Result<T> = std::result::Result<T, SieveError>;

/// Error type for bloomsieve operations
#[derive(Error, Debug)]
pub enum SieveError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Input file cannot be opened or parsed
    #[error("Invalid input '{path}': {reason}")]
    InputFile {
        /// Path to the file
        path: PathBuf,
        /// Explanation of the problem
        reason: String,
    },

    /// Bloom filter or its sidecar info file cannot be loaded
    #[error("Cannot load filter '{path}': {reason}")]
    FilterLoad {
        /// Path to the filter file
        path: PathBuf,
        /// Explanation of the problem
        reason: String,
    },

    /// Filters in one run must share a single k-mer size
    #[error(
        "Filter '{filter}' has k-mer size {found} but the filter set uses {expected}; \
         all filters in one run must share the same k-mer size"
    )]
    KmerSizeMismatch {
        /// The k-mer size established by the first filter
        expected: u32,
        /// The offending filter's k-mer size
        found: u32,
        /// The offending filter's label
        filter: String,
    },

    /// The filter was built with an unsupported hash family
    #[error("Filter '{filter}' uses hash family '{family}', expected '{expected}'")]
    HashFamilyMismatch {
        /// The hash family recorded in the sidecar
        family: String,
        /// The hash family this build supports
        expected: String,
        /// The offending filter's label
        filter: String,
    },

    /// Output file cannot be created or written
    #[error("Cannot write output '{path}': {source}")]
    Output {
        /// Path to the output file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread panicked
    #[error("Pipeline thread panicked during {stage}")]
    ThreadPanic {
        /// Which pipeline stage the thread belonged to
        stage: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter() {
        let error = SieveError::InvalidParameter {
            parameter: "score".to_string(),
            reason: "must be between 0 and 1".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("Invalid parameter 'score'"));
        assert!(msg.contains("between 0 and 1"));
    }

    #[test]
    fn test_kmer_size_mismatch() {
        let error = SieveError::KmerSizeMismatch {
            expected: 25,
            found: 31,
            filter: "human".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("human"));
        assert!(msg.contains("31"));
        assert!(msg.contains("25"));
    }

    #[test]
    fn test_hash_family_mismatch() {
        let error = SieveError::HashFamilyMismatch {
            family: "cityhash".to_string(),
            expected: "murmur64a".to_string(),
            filter: "ecoli".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("cityhash"));
        assert!(msg.contains("murmur64a"));
    }

    #[test]
    fn test_filter_load() {
        let error = SieveError::FilterLoad {
            path: PathBuf::from("/data/human.bf"),
            reason: "sidecar info file is missing".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("human.bf"));
        assert!(msg.contains("sidecar"));
    }
}
