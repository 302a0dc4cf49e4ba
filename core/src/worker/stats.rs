//! Worker statistics tracking

use std::time::{Duration, Instant};

/// Call counts and timing tracked by each worker
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Calls that finished without error
    pub completed: usize,

    /// Calls that failed
    pub errors: usize,

    /// Summed duration of every attempted call
    pub busy: Duration,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Calls attempted (completed + errors)
    pub fn total_calls(&self) -> usize {
        self.completed + self.errors
    }

    /// Fraction of calls that succeeded (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.total_calls() == 0 {
            0.0
        } else {
            self.completed as f64 / self.total_calls() as f64
        }
    }

    /// Fraction of calls that failed (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total_calls() == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_calls() as f64
        }
    }

    /// Mean duration of an attempted call
    pub fn mean_call_duration(&self) -> Option<Duration> {
        u32::try_from(self.total_calls())
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.busy / n)
    }

    /// Time since start, or run length once stopped
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Attempted calls per second
    pub fn calls_per_second(&self) -> f64 {
        self.elapsed()
            .map(|d| {
                let secs = d.as_secs_f64();
                if secs > 0.0 {
                    self.total_calls() as f64 / secs
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0)
    }

    /// Record a successful call
    pub fn record_success(&mut self, duration: Duration) {
        self.completed += 1;
        self.busy += duration;
    }

    /// Record a failed call
    pub fn record_error(&mut self, duration: Duration) {
        self.errors += 1;
        self.busy += duration;
    }

    /// Merge stats from another worker
    pub fn merge(&mut self, other: &WorkerStats) {
        self.completed += other.completed;
        self.errors += other.errors;
        self.busy += other.busy;
    }
}
