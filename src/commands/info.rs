//! Report the parameters of Bloom filter files.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use bloomsieve_lib::bloom;
use bloomsieve_lib::logging::format_count;
use bloomsieve_lib::validation::validate_file_exists;

use crate::commands::command::Command;

/// Print the sidecar parameters of one or more Bloom filters.
#[derive(Debug, Parser)]
#[command(
    name = "info",
    about = "Print Bloom filter parameters",
    long_about = r#"
Print the parameters recorded in each filter's sidecar info file: label,
k-mer size, hash count, bit-array size, entry count and the false-positive
rate the filter was sized for. Only the sidecars are read; the bit arrays
are never loaded.

Example usage:
  bloomsieve info human.bf mouse.bf
"#
)]
pub struct Info {
    /// Bloom filter files (.bf) to report on
    #[arg(required = true)]
    pub filters: Vec<PathBuf>,
}

impl Command for Info {
    fn execute(&self) -> Result<()> {
        for path in &self.filters {
            validate_file_exists(bloom::sidecar_path(path), "Filter info file")?;
            let info = bloom::load_info(path)?;
            info!("{}:", path.display());
            info!("  filter_id:   {}", info.filter_id);
            info!("  kmer_size:   {}", info.kmer_size);
            info!("  num_hash:    {}", info.num_hash);
            info!("  size_bits:   {}", format_count(info.size_bits));
            info!("  num_entries: {}", format_count(info.num_entries));
            info!("  fpr:         {:.3e}", info.fpr);
            info!("  hash_family: {}", info.hash_family);
        }
        Ok(())
    }
}
