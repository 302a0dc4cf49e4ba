//! Per-call records and latency summaries

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::method::StreamingShape;

/// Outcome of one attempted call, sent by workers on the record channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Worker that issued the call
    pub worker_id: String,

    /// Run-wide sequence number of the call
    pub request_number: u64,

    /// Streaming shape of the method
    pub shape: StreamingShape,

    /// Wall time of the call in milliseconds
    pub duration_ms: f64,

    /// Failure message, if the call failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the call finished
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CallRecord {
    /// Whether the call finished without error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a set of call records
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CallSummary {
    /// Calls attempted
    pub total_calls: usize,
    /// Calls without error
    pub successful_calls: usize,
    /// Calls with an error
    pub failed_calls: usize,
    /// Fraction of failed calls
    pub error_rate: f64,
    /// Attempted calls per second over `total_duration_secs`
    pub calls_per_second: f64,
    /// Latency of every attempted call
    pub latency: LatencyPercentiles,
    /// Run length the rate is computed over
    pub total_duration_secs: f64,
}

impl CallSummary {
    /// Summarise `records` gathered over `duration`
    pub fn from_records(records: &[CallRecord], duration: Duration) -> Self {
        let total_calls = records.len();
        let successful_calls = records.iter().filter(|r| r.is_success()).count();
        let failed_calls = total_calls - successful_calls;
        let error_rate = if total_calls > 0 {
            failed_calls as f64 / total_calls as f64
        } else {
            0.0
        };

        let duration_secs = duration.as_secs_f64();
        let calls_per_second = if duration_secs > 0.0 {
            total_calls as f64 / duration_secs
        } else {
            0.0
        };

        let durations: Vec<f64> = records.iter().map(|r| r.duration_ms).collect();

        Self {
            total_calls,
            successful_calls,
            failed_calls,
            error_rate,
            calls_per_second,
            latency: LatencyPercentiles::from_values(&durations),
            total_duration_secs: duration_secs,
        }
    }
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct LatencyPercentiles {
    /// Minimum
    pub min: f64,
    /// 50th percentile
    pub p50: f64,
    /// 75th percentile
    pub p75: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Maximum
    pub max: f64,
    /// Mean
    pub mean: f64,
    /// Sample standard deviation
    pub stddev: f64,
}

impl LatencyPercentiles {
    /// Compute percentiles with linear interpolation between samples
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let len = sorted.len();
        let mean = sorted.iter().sum::<f64>() / len as f64;

        let variance = if len > 1 {
            sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (len - 1) as f64
        } else {
            0.0
        };

        Self {
            min: sorted[0],
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
            p90: percentile(&sorted, 0.90),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            max: sorted[len - 1],
            mean,
            stddev: variance.sqrt(),
        }
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let idx = p * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;

    if upper >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}
