//! Orchestrator execution logic

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};

use crate::codec::MessageCodec;
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::method::MethodDescriptor;
use crate::metrics::CallRecord;
use crate::traits::Transport;
use crate::worker::WorkerBuilder;

use super::aggregator::{aggregate_worker_stats, RunSummary};

/// Orchestrator manages the run lifecycle
///
/// Responsible for spawning workers, coordinating shutdown,
/// and collecting results.
pub struct Orchestrator {
    /// Run configuration (shared with every worker)
    pub(crate) config: Arc<RunConfig>,

    /// Method under test
    pub(crate) method: Arc<MethodDescriptor>,

    /// Transport (shared across workers)
    pub(crate) transport: Arc<dyn Transport>,

    /// Payload codec (shared across workers)
    pub(crate) codec: Arc<dyn MessageCodec>,

    /// Call record sender (cloned for each worker)
    pub(crate) record_tx: mpsc::Sender<CallRecord>,

    /// Stop signal sender
    pub(crate) shutdown_tx: broadcast::Sender<()>,

    /// Run-wide request number counter
    pub(crate) request_counter: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(
        config: Arc<RunConfig>,
        method: Arc<MethodDescriptor>,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn MessageCodec>,
        record_tx: mpsc::Sender<CallRecord>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            method,
            transport,
            codec,
            record_tx,
            shutdown_tx,
            request_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a stop signal receiver
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Stop all workers before their next call
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Calls assigned to worker `index`
    ///
    /// The total is split evenly; the first `total % concurrency` workers take
    /// one extra call.
    pub fn calls_for(&self, index: usize) -> usize {
        let workers = self.config.concurrency.max(1);
        let base = self.config.total / workers;
        let extra = usize::from(index < self.config.total % workers);
        base + extra
    }

    /// Run the benchmark
    ///
    /// Spawns one task per worker, waits for all of them, and returns the
    /// aggregated stats together with every call failure.
    pub async fn run(&self) -> BenchResult<RunSummary> {
        let start = Instant::now();
        let mut handles = Vec::with_capacity(self.config.concurrency);

        tracing::info!(
            method = %self.method.fully_qualified_name,
            shape = %self.method.shape(),
            transport = self.transport.name(),
            total = self.config.total,
            concurrency = self.config.concurrency,
            qps = self.config.qps,
            "Starting run"
        );

        for index in 0..self.config.concurrency {
            let worker_id = format!("w{index}");
            let worker = WorkerBuilder::new(worker_id.clone())
                .method(Arc::clone(&self.method))
                .transport(Arc::clone(&self.transport))
                .codec(Arc::clone(&self.codec))
                .config(Arc::clone(&self.config))
                .request_counter(Arc::clone(&self.request_counter))
                .calls(self.calls_for(index))
                .record_tx(self.record_tx.clone())
                .build()?;
            let shutdown_rx = self.shutdown_tx.subscribe();

            handles.push((worker_id, tokio::spawn(worker.run(shutdown_rx))));
        }

        let mut stats = Vec::with_capacity(handles.len());
        let mut errors = Vec::new();
        let mut worker_failures = 0;
        for (worker_id, handle) in handles {
            match handle.await {
                Ok(Ok(worker_stats)) => {
                    tracing::debug!(
                        worker_id = %worker_id,
                        completed = worker_stats.completed,
                        "Worker completed"
                    );
                    stats.push(worker_stats);
                }
                Ok(Err(failures)) => {
                    tracing::debug!(
                        worker_id = %worker_id,
                        completed = failures.stats.completed,
                        errors = failures.len(),
                        "Worker completed with failed calls"
                    );
                    stats.push(failures.stats);
                    errors.extend(failures.errors);
                }
                Err(e) => {
                    worker_failures += 1;
                    tracing::error!(worker_id = %worker_id, error = %e, "Worker task panicked");
                }
            }
        }

        if stats.is_empty() && worker_failures > 0 {
            return Err(BenchError::orchestration(format!(
                "All {worker_failures} workers failed to complete"
            )));
        }

        let aggregated = aggregate_worker_stats(&stats);
        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            total_completed = aggregated.total_completed,
            total_errors = aggregated.total_errors,
            rps = aggregated.calls_per_second,
            "Run completed"
        );

        Ok(RunSummary {
            stats: aggregated,
            errors,
        })
    }

    /// Run with Ctrl+C signal handling
    ///
    /// Ctrl+C stops every worker before its next call.
    pub async fn run_with_signal_handling(&self) -> BenchResult<RunSummary> {
        let shutdown_tx = self.shutdown_tx.clone();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, stopping workers...");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.run().await;
        signal_handle.abort();

        result
    }

    /// Run for at most `duration`
    ///
    /// Workers stop before their next call once the duration has elapsed.
    pub async fn run_with_timeout(&self, duration: Duration) -> BenchResult<RunSummary> {
        let shutdown_tx = self.shutdown_tx.clone();

        let timeout_handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            tracing::info!("Run duration reached, stopping workers...");
            let _ = shutdown_tx.send(());
        });

        let result = self.run().await;
        timeout_handle.abort();

        result
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("method", &self.method.fully_qualified_name)
            .field("transport", &self.transport.name())
            .finish()
    }
}
