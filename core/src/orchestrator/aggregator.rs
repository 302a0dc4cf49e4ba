//! Result aggregation from multiple workers

use std::time::Duration;

use crate::error::CallError;
use crate::worker::WorkerStats;

/// Aggregated statistics from all workers
#[derive(Debug, Clone, Default)]
pub struct AggregatedStats {
    /// Number of workers that reported
    pub total_workers: usize,

    /// Total successful calls
    pub total_completed: usize,

    /// Total failed calls
    pub total_errors: usize,

    /// Maximum duration across all workers
    pub total_duration: Duration,

    /// Overall attempted calls per second
    pub calls_per_second: f64,

    /// Mean duration of an attempted call
    pub mean_call_duration: Option<Duration>,
}

impl AggregatedStats {
    /// Get the total number of calls (completed + errors)
    pub fn total_calls(&self) -> usize {
        self.total_completed + self.total_errors
    }

    /// Get the success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.total_calls();
        if total > 0 {
            self.total_completed as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Get the error rate (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        let total = self.total_calls();
        if total > 0 {
            self.total_errors as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Aggregate statistics from multiple workers
pub fn aggregate_worker_stats(stats: &[WorkerStats]) -> AggregatedStats {
    if stats.is_empty() {
        return AggregatedStats::default();
    }

    let mut merged = WorkerStats::new();
    for s in stats {
        merged.merge(s);
    }

    // Workers run concurrently, so the run lasts as long as the slowest one
    let total_duration = stats
        .iter()
        .filter_map(|s| s.elapsed())
        .max()
        .unwrap_or(Duration::ZERO);

    let secs = total_duration.as_secs_f64();
    let calls_per_second = if secs > 0.0 {
        merged.total_calls() as f64 / secs
    } else {
        0.0
    };

    AggregatedStats {
        total_workers: stats.len(),
        total_completed: merged.completed,
        total_errors: merged.errors,
        total_duration,
        calls_per_second,
        mean_call_duration: merged.mean_call_duration(),
    }
}

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Counts and timing across all workers
    pub stats: AggregatedStats,

    /// Every call failure, in worker order
    pub errors: Vec<CallError>,
}

impl RunSummary {
    /// Whether every attempted call succeeded
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Distinct failure messages with their counts, most frequent first
    pub fn error_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for err in &self.errors {
            let message = err.to_string();
            match counts.iter_mut().find(|(m, _)| *m == message) {
                Some((_, n)) => *n += 1,
                None => counts.push((message, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}
