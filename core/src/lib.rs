//! rpcbench-core: request execution core of an RPC load generator
//!
//! This crate provides everything that happens between "the run is
//! configured" and "a call was made", including:
//!
//! - The call template engine and its function library
//! - The per-call template context
//! - Worker dispatch loops for every streaming shape
//! - The orchestrator that fans calls out over concurrent workers
//! - Call records and latency summaries
//!
//! Network transport is abstracted behind [`Transport`]; an in-process
//! [`LoopbackTransport`] is included for dry runs and tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod loopback;
pub mod message;
pub mod method;
pub mod metrics;
pub mod orchestrator;
pub mod template;
pub mod traits;
pub mod worker;

pub use channel::ChannelConfig;
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use config::{ConfigError, RunConfig};
pub use context::CallTemplateContext;
pub use error::*;
pub use loopback::LoopbackTransport;
pub use message::{DynamicMessage, Payload};
pub use method::{MethodDescriptor, StreamingShape};
pub use metrics::*;
pub use orchestrator::{AggregatedStats, Orchestrator, OrchestratorBuilder, RunSummary};
pub use template::{MetadataError, Template, TemplateCache, TemplateError};
pub use traits::*;
pub use worker::{Pacer, Worker, WorkerBuilder, WorkerStats};
