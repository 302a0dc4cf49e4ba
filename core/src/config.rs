//! Run configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::method::MethodDescriptor;

/// Run configuration
///
/// Built once before any worker starts and shared read-only by all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Total number of calls to issue across all workers
    pub total: usize,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Per-worker rate limit in calls per second (0 disables pacing)
    #[serde(default)]
    pub qps: u32,

    /// Deadline applied to each call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Payload source: JSON template text, or delimited binary messages
    #[serde(default)]
    pub data: Vec<u8>,

    /// Metadata template text (expands to a JSON object of strings)
    #[serde(default)]
    pub metadata: String,

    /// Treat `data` as binary messages instead of a JSON template
    #[serde(default)]
    pub binary: bool,

    /// Delay before each message sent on a request stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_interval: Option<Duration>,

    /// Resolve payloads and metadata without issuing calls
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total: 200,
            concurrency: 50,
            qps: 0,
            timeout: Some(Duration::from_secs(20)),
            data: Vec::new(),
            metadata: String::new(),
            binary: false,
            stream_interval: None,
            dry_run: false,
        }
    }
}

impl RunConfig {
    /// Create a config issuing `total` calls with `concurrency` workers
    pub fn new(total: usize, concurrency: usize) -> Self {
        Self {
            total,
            concurrency,
            ..Default::default()
        }
    }

    /// Set the JSON payload template
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self.binary = false;
        self
    }

    /// Set a binary payload
    pub fn with_binary_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self.binary = true;
        self
    }

    /// Set the metadata template
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Set the per-worker rate
    pub fn with_qps(mut self, qps: u32) -> Self {
        self.qps = qps;
        self
    }

    /// Set the per-call deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-stream-message delay
    pub fn with_stream_interval(mut self, interval: Option<Duration>) -> Self {
        self.stream_interval = interval;
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Fixed delay between two calls of one worker, when a rate is set
    pub fn pacing_interval(&self) -> Option<Duration> {
        (self.qps > 0).then(|| Duration::from_secs(1) / self.qps)
    }

    /// Source text of each element when the payload is a top-level JSON array
    ///
    /// Only applies to JSON payloads of methods that are not client-streaming;
    /// otherwise, or when the payload is not a JSON array before expansion,
    /// returns an empty list and the whole payload is expanded on each call.
    pub fn json_variants(&self, method: &MethodDescriptor) -> Vec<String> {
        if self.binary || method.client_streaming {
            return Vec::new();
        }

        match serde_json::from_slice::<Vec<Box<RawValue>>>(&self.data) {
            Ok(items) => items.iter().map(|item| item.get().to_string()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(
                "concurrency must be at least 1".into(),
            ));
        }

        if self.total == 0 {
            return Err(ConfigError::InvalidTotal(
                "call count must be at least 1".into(),
            ));
        }

        if self.concurrency > self.total {
            return Err(ConfigError::InvalidConcurrency(format!(
                "concurrency ({}) cannot exceed call count ({})",
                self.concurrency, self.total
            )));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTimeout(
                "timeout must be positive when set".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid concurrency value
    #[error("Invalid concurrency: {0}")]
    InvalidConcurrency(String),

    /// Invalid call count
    #[error("Invalid call count: {0}")]
    InvalidTotal(String),

    /// Invalid timeout
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}
