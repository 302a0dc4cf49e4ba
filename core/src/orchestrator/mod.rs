//! Orchestrator for run lifecycle management
//!
//! The Orchestrator coordinates a complete run:
//! - Spawning one worker task per unit of concurrency
//! - Sharing the run-wide request number counter
//! - Managing graceful stop via a broadcast channel
//! - Collecting stats and call failures from all workers
//!
//! # Example
//!
//! ```ignore
//! use rpcbench_core::{OrchestratorBuilder, RunConfig};
//!
//! let (orchestrator, records) = OrchestratorBuilder::new()
//!     .config(RunConfig::new(1000, 10))
//!     .method(method)
//!     .transport(transport)
//!     .build()?;
//!
//! let summary = orchestrator.run_with_signal_handling().await?;
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::{aggregate_worker_stats, AggregatedStats, RunSummary};
pub use builder::OrchestratorBuilder;
pub use executor::Orchestrator;
