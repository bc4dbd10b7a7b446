//! Logging helpers for formatted counts, elapsed time and operation timing.

use std::time::{Duration, Instant};

/// Formats a count with thousands separators (`1234567` -> `"1,234,567"`).
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats an elapsed duration compactly: fractional seconds under a
/// minute, then decimal minutes, then decimal hours (`0.5s`, `2.4m`, `1.5h`).
#[must_use]
pub fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Formats a throughput figure, switching to thousands of reads per second
/// once the rate earns it.
#[must_use]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64().max(f64::EPSILON);
    let per_sec = count as f64 / secs;
    if per_sec >= 1000.0 {
        format!("{:.0}k reads/s", per_sec / 1000.0)
    } else {
        format!("{per_sec:.1} reads/s")
    }
}

/// Operation timing and summary helper.
///
/// # Example
/// ```no_run
/// use bloomsieve_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Categorizing reads");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with item count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} reads in {} ({})",
            self.operation,
            format_count(count),
            format_elapsed(duration),
            format_rate(count, duration)
        );
    }
}
