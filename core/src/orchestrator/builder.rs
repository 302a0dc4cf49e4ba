//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::ChannelConfig;
use crate::codec::{JsonCodec, MessageCodec};
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::method::MethodDescriptor;
use crate::metrics::CallRecord;
use crate::traits::Transport;

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let (orchestrator, records) = OrchestratorBuilder::new()
///     .config(RunConfig::new(1000, 10).with_qps(50))
///     .method(method)
///     .transport(transport)
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    config: RunConfig,
    method: Option<MethodDescriptor>,
    transport: Option<Arc<dyn Transport>>,
    codec: Arc<dyn MessageCodec>,
    channel_config: ChannelConfig,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            method: None,
            transport: None,
            codec: Arc::new(JsonCodec::new()),
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the full run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of concurrent workers
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the total number of calls
    pub fn total(mut self, total: usize) -> Self {
        self.config.total = total;
        self
    }

    /// Set the method under test
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the payload codec
    pub fn codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the orchestrator and return it along with the call record receiver
    ///
    /// # Errors
    ///
    /// Returns an error if the method or transport is not set, or if
    /// configuration validation fails.
    pub fn build(self) -> BenchResult<(Orchestrator, mpsc::Receiver<CallRecord>)> {
        let method = self
            .method
            .ok_or_else(|| BenchError::missing_config("method"))?;

        let transport = self
            .transport
            .ok_or_else(|| BenchError::missing_config("transport"))?;

        self.config
            .validate()
            .map_err(|e| BenchError::config(e.to_string()))?;

        let (record_tx, record_rx) = mpsc::channel(self.channel_config.record_buffer.max(1));

        let orchestrator = Orchestrator::new(
            Arc::new(self.config),
            Arc::new(method),
            transport,
            self.codec,
            record_tx,
        );

        Ok((orchestrator, record_rx))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
