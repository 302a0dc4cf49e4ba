//! Worker execution loop

use crate::codec::MessageCodec;
use crate::config::RunConfig;
use crate::context::CallTemplateContext;
use crate::error::{AggregateError, CallError};
use crate::message::DynamicMessage;
use crate::method::MethodDescriptor;
use crate::metrics::CallRecord;
use crate::traits::{CallOptions, Transport};

use super::dispatch::CallPlan;
use super::rate_limiter::Pacer;
use super::stats::WorkerStats;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;

/// Worker issues one sequential stream of calls: pace -> render -> dispatch -> record
///
/// Workers run as independent tokio tasks managed by the Orchestrator. The
/// only state they share is the request number counter.
pub struct Worker {
    /// Worker identifier, visible to templates as `.WorkerID`
    pub(crate) id: String,

    /// Method under test
    pub(crate) method: Arc<MethodDescriptor>,

    /// Transport (shared across workers via Arc)
    pub(crate) transport: Arc<dyn Transport>,

    /// Payload decoder
    pub(crate) codec: Arc<dyn MessageCodec>,

    /// Run configuration
    pub(crate) config: Arc<RunConfig>,

    /// Run-wide request number source
    pub(crate) request_counter: Arc<AtomicU64>,

    /// Calls this worker makes unless stopped
    pub(crate) calls: usize,

    /// Fixed-interval pacer
    pub(crate) pacer: Pacer,

    /// Optional call record sink
    pub(crate) record_tx: Option<mpsc::Sender<CallRecord>>,

    /// Source text of each element of a top-level JSON array payload
    pub(crate) json_variants: Vec<String>,

    /// Decoded binary payload, reused by every call
    pub(crate) cached_messages: Option<Arc<Vec<DynamicMessage>>>,
}

impl Worker {
    /// Run the worker loop
    ///
    /// Stops after the configured number of calls, or before the next call once
    /// `stop` fires. Returns the stats when every call succeeded, otherwise an
    /// [`AggregateError`] holding the stats and every call failure.
    pub async fn run(mut self, mut stop: broadcast::Receiver<()>) -> Result<WorkerStats, AggregateError> {
        let mut stats = WorkerStats::new();
        let mut errors = Vec::new();
        stats.start();

        tracing::debug!(worker_id = %self.id, calls = self.calls, "Worker started");

        for _ in 0..self.calls {
            if stop_requested(&mut stop) {
                tracing::debug!(
                    worker_id = %self.id,
                    completed = stats.completed,
                    errors = stats.errors,
                    "Worker received stop signal"
                );
                break;
            }

            self.pacer.wait().await;

            // A stop that arrived during the pacing wait still wins
            if self.pacer.is_enabled() && stop_requested(&mut stop) {
                tracing::debug!(
                    worker_id = %self.id,
                    completed = stats.completed,
                    errors = stats.errors,
                    "Worker received stop signal while paced"
                );
                break;
            }

            let request_number = self.request_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let start = Instant::now();
            let result = self.make_call(request_number).await;
            let duration = start.elapsed();

            let error = match result {
                Ok(()) => {
                    stats.record_success(duration);
                    None
                }
                Err(e) => {
                    stats.record_error(duration);
                    tracing::warn!(
                        worker_id = %self.id,
                        request_number,
                        error = %e,
                        "Call failed"
                    );
                    let message = e.to_string();
                    errors.push(e);
                    Some(message)
                }
            };

            self.send_record(request_number, duration, error).await;
        }

        stats.stop();
        tracing::debug!(
            worker_id = %self.id,
            completed = stats.completed,
            errors = stats.errors,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        if errors.is_empty() {
            Ok(stats)
        } else {
            Err(AggregateError { stats, errors })
        }
    }

    /// Render, resolve and dispatch one call
    async fn make_call(&mut self, request_number: u64) -> Result<(), CallError> {
        let ctx = CallTemplateContext::new(&self.method, self.id.as_str(), request_number);
        let messages = self.resolve_messages(&ctx)?;

        if self.config.dry_run {
            return Ok(());
        }

        let metadata = ctx.execute_metadata(&self.config.metadata)?;
        let options = CallOptions::new()
            .with_metadata(metadata)
            .with_timeout(self.config.timeout);

        let plan = CallPlan {
            transport: self.transport.as_ref(),
            options: &options,
            method: &self.method,
            request_number,
            stream_interval: self.config.stream_interval,
        };

        match self.config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, plan.dispatch(&messages))
                .await
                .map_err(|_| CallError::Timeout(timeout))?,
            None => plan.dispatch(&messages).await,
        }
    }

    /// Input messages for the call described by `ctx`
    fn resolve_messages(
        &mut self,
        ctx: &CallTemplateContext,
    ) -> Result<Arc<Vec<DynamicMessage>>, CallError> {
        if let Some(cached) = &self.cached_messages {
            return Ok(Arc::clone(cached));
        }

        if self.config.binary {
            let messages = Arc::new(self.codec.decode_binary(&self.method, &self.config.data)?);
            self.cached_messages = Some(Arc::clone(&messages));
            return Ok(messages);
        }

        let source = if self.json_variants.is_empty() {
            String::from_utf8_lossy(&self.config.data)
        } else {
            let index = (ctx.request_number - 1) % self.json_variants.len() as u64;
            self.json_variants[index as usize].as_str().into()
        };

        let data = ctx.execute_data(&source);
        if self.config.dry_run {
            tracing::info!(
                worker_id = %self.id,
                request_number = ctx.request_number,
                payload = %String::from_utf8_lossy(&data),
                "Dry run"
            );
        }

        Ok(Arc::new(self.codec.decode_json(&self.method, &data)?))
    }

    async fn send_record(&mut self, request_number: u64, duration: Duration, error: Option<String>) {
        let Some(tx) = &self.record_tx else {
            return;
        };

        let record = CallRecord {
            worker_id: self.id.clone(),
            request_number,
            shape: self.method.shape(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            error,
            timestamp: chrono::Utc::now(),
        };

        if tx.send(record).await.is_err() {
            tracing::debug!(worker_id = %self.id, "Record channel closed, no longer reporting calls");
            self.record_tx = None;
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of calls this worker makes unless stopped
    pub fn calls(&self) -> usize {
        self.calls
    }
}

/// Non-blocking check of the stop signal
fn stop_requested(stop: &mut broadcast::Receiver<()>) -> bool {
    match stop.try_recv() {
        Ok(()) | Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("method", &self.method.fully_qualified_name)
            .field("transport", &self.transport.name())
            .field("calls", &self.calls)
            .field("pacer", &self.pacer)
            .field("json_variants", &self.json_variants.len())
            .finish()
    }
}
