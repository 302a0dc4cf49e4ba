//! Transport traits
//!
//! The worker never talks to the network directly. A ready-to-use stub
//! implementing [`Transport`] is handed in by whoever owns channel and TLS
//! setup; the worker only drives the per-call protocol state machines.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::message::DynamicMessage;
use crate::method::MethodDescriptor;

// ============================================================================
// Call options
// ============================================================================

/// Per-call settings passed to every transport operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Outgoing request metadata (headers)
    pub metadata: HashMap<String, String>,

    /// Deadline for the whole call, if any
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach outgoing metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the call deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Issues RPC invocations of any streaming shape
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport identifier used in logs
    fn name(&self) -> &str;

    /// Single request, single response
    async fn invoke_unary(
        &self,
        options: &CallOptions,
        method: &MethodDescriptor,
        message: DynamicMessage,
    ) -> Result<DynamicMessage, TransportError>;

    /// Open a client-streaming call
    async fn open_client_stream(
        &self,
        options: &CallOptions,
        method: &MethodDescriptor,
    ) -> Result<Box<dyn ClientStream>, TransportError>;

    /// Open a server-streaming call with its single request
    async fn open_server_stream(
        &self,
        options: &CallOptions,
        method: &MethodDescriptor,
        message: DynamicMessage,
    ) -> Result<Box<dyn StreamReceiver>, TransportError>;

    /// Open a bidirectional call, split into independently usable halves
    async fn open_bidi_stream(
        &self,
        options: &CallOptions,
        method: &MethodDescriptor,
    ) -> Result<(Box<dyn StreamSender>, Box<dyn StreamReceiver>), TransportError>;
}

/// Sending side of a client-streaming call
#[async_trait]
pub trait ClientStream: Send {
    /// Send one message
    ///
    /// Returns [`TransportError::StreamClosed`] when the remote side has
    /// already closed the stream; the final status is then obtained through
    /// [`close_and_receive`](Self::close_and_receive).
    async fn send(&mut self, message: DynamicMessage) -> Result<(), TransportError>;

    /// Half-close the stream and wait for the single response
    async fn close_and_receive(&mut self) -> Result<DynamicMessage, TransportError>;
}

/// Sending half of a bidirectional call
#[async_trait]
pub trait StreamSender: Send {
    /// Send one message
    async fn send(&mut self, message: DynamicMessage) -> Result<(), TransportError>;

    /// Half-close the sending side
    async fn close_send(&mut self) -> Result<(), TransportError>;
}

/// Receiving half of a server-streaming or bidirectional call
#[async_trait]
pub trait StreamReceiver: Send {
    /// Next response message, or `None` once the stream has ended
    async fn receive(&mut self) -> Result<Option<DynamicMessage>, TransportError>;
}

// ============================================================================
// Transport errors
// ============================================================================

/// RPC-layer failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The remote side closed the stream before everything was sent
    #[error("stream closed by remote")]
    StreamClosed,

    /// The call finished with a non-OK status
    #[error("status {code}: {message}")]
    Status {
        /// Status code name (e.g. `Unavailable`)
        code: String,
        /// Status message
        message: String,
    },

    /// The transport gave up waiting
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Build a status error
    pub fn status(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            code: code.into(),
            message: message.into(),
        }
    }
}
