//! Builder pattern for Worker construction

use crate::codec::{JsonCodec, MessageCodec};
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::method::MethodDescriptor;
use crate::metrics::CallRecord;
use crate::traits::Transport;

use super::executor::Worker;
use super::rate_limiter::Pacer;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new("w0")
///     .method(method)
///     .transport(transport)
///     .config(config)
///     .request_counter(counter)
///     .calls(100)
///     .build()?;
/// ```
pub struct WorkerBuilder {
    id: String,
    method: Option<Arc<MethodDescriptor>>,
    transport: Option<Arc<dyn Transport>>,
    codec: Option<Arc<dyn MessageCodec>>,
    config: Option<Arc<RunConfig>>,
    request_counter: Option<Arc<AtomicU64>>,
    calls: Option<usize>,
    record_tx: Option<mpsc::Sender<CallRecord>>,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: None,
            transport: None,
            codec: None,
            config: None,
            request_counter: None,
            calls: None,
            record_tx: None,
        }
    }

    /// Set the method under test
    pub fn method(mut self, method: Arc<MethodDescriptor>) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the payload codec (defaults to [`JsonCodec`])
    pub fn codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set the run configuration
    pub fn config(mut self, config: Arc<RunConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Share a request number counter with other workers
    ///
    /// Defaults to a fresh counter owned by this worker.
    pub fn request_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.request_counter = Some(counter);
        self
    }

    /// Number of calls this worker makes (defaults to the configured total)
    pub fn calls(mut self, calls: usize) -> Self {
        self.calls = Some(calls);
        self
    }

    /// Set the call record channel sender
    pub fn record_tx(mut self, tx: mpsc::Sender<CallRecord>) -> Self {
        self.record_tx = Some(tx);
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if the method, transport or config is missing.
    pub fn build(self) -> BenchResult<Worker> {
        let method = self.method.ok_or(BenchError::missing_config("method"))?;
        let transport = self
            .transport
            .ok_or(BenchError::missing_config("transport"))?;
        let config = self.config.ok_or(BenchError::missing_config("config"))?;

        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(JsonCodec::new()));
        let request_counter = self
            .request_counter
            .unwrap_or_else(|| Arc::new(AtomicU64::new(0)));
        let calls = self.calls.unwrap_or(config.total);

        let json_variants = config.json_variants(&method);
        let pacer = Pacer::new(config.pacing_interval());

        Ok(Worker {
            id: self.id,
            method,
            transport,
            codec,
            config,
            request_counter,
            calls,
            pacer,
            record_tx: self.record_tx,
            json_variants,
            cached_messages: None,
        })
    }
}
