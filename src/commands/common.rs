//! Common CLI options shared across commands.
//!
//! Shared argument structures composed into command structs with
//! `#[command(flatten)]`.

use clap::Args;

/// Common threading options for parallel classification.
#[derive(Debug, Clone, Default, Args)]
pub struct ThreadingOptions {
    /// Number of worker threads. Defaults to the hardware parallelism
    /// reported by the platform.
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,
}

impl ThreadingOptions {
    /// Returns the worker count: the explicit setting when given, otherwise
    /// the platform's available parallelism (at least 1).
    #[must_use]
    pub fn num_threads(&self) -> usize {
        match self.threads {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}
