//! Error types for rpcbench-core

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::template::MetadataError;
use crate::traits::TransportError;
use crate::worker::WorkerStats;

/// Errors raised while assembling or orchestrating a run
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A required builder field was never set
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// Worker pool failure
    #[error("orchestration error: {0}")]
    Orchestration(String),
}

impl BenchError {
    /// Shorthand for [`BenchError::Config`]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Shorthand for [`BenchError::MissingConfig`]
    pub fn missing_config(field: &'static str) -> Self {
        Self::MissingConfig(field)
    }

    /// Shorthand for [`BenchError::Orchestration`]
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration(message.into())
    }
}

/// Result type alias for run assembly
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Failure of a single call attempt
///
/// A call error never stops the worker loop; it is collected into the
/// worker's [`AggregateError`].
#[derive(Error, Debug)]
pub enum CallError {
    /// No input message could be resolved for the call
    #[error("no data provided for request")]
    NoData,

    /// The expanded payload could not be turned into messages
    #[error("payload error: {0}")]
    Payload(#[from] CodecError),

    /// The metadata template did not expand to a string map
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// The transport reported a failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The per-call deadline expired
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// Every per-call failure observed during one worker's run
#[derive(Debug)]
pub struct AggregateError {
    /// Worker statistics at the moment the run ended
    pub stats: WorkerStats,

    /// Collected failures, in the order they happened
    pub errors: Vec<CallError>,
}

impl AggregateError {
    /// Number of failed calls
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no failure was collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
