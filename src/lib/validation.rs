//! Input validation utilities
//!
//! Common validation functions for command-line parameters and file paths
//! with consistent error messages, built on the structured error types from
//! [`crate::errors`].

use std::path::Path;

use crate::errors::{Result, SieveError};

/// Validate that a file exists.
///
/// # Arguments
/// * `path` - Path to validate
/// * `description` - Human-readable description of the file (e.g., "Input file")
///
/// # Errors
/// Returns an error if the file does not exist
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(SieveError::InputFile {
            path: path_ref.to_path_buf(),
            reason: format!("{description} does not exist"),
        });
    }
    Ok(())
}

/// Validate that a value lies in the closed unit interval [0.0, 1.0].
///
/// # Errors
/// Returns an error naming the parameter when out of range
pub fn validate_unit_interval(value: f64, name: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SieveError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("must be between 0 and 1, got: {value}"),
        });
    }
    Ok(())
}

/// Validate that a value is positive (> 0).
///
/// # Errors
/// Returns an error naming the parameter when zero
pub fn validate_positive(value: usize, name: &str) -> Result<()> {
    if value == 0 {
        return Err(SieveError::InvalidParameter {
            parameter: name.to_string(),
            reason: "must be positive (> 0), got: 0".to_string(),
        });
    }
    Ok(())
}
