//! In-process transport that answers every call with its own input
//!
//! Useful for dry runs of a configuration, for measuring the worker's own
//! overhead, and in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use crate::message::DynamicMessage;
use crate::method::MethodDescriptor;
use crate::traits::{
    CallOptions, ClientStream, StreamReceiver, StreamSender, Transport, TransportError,
};

/// Echo transport
///
/// - unary: returns the request
/// - client streaming: returns the last message sent (`{}` if none)
/// - server streaming: yields the request once
/// - bidirectional: yields every message sent, until the send side closes
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    latency: Option<Duration>,
    opened: AtomicU64,
}

impl LoopbackTransport {
    /// Create a transport answering immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency).filter(|d| !d.is_zero());
        self
    }

    /// Number of calls opened so far
    pub fn calls(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    fn open(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }
}

async fn delay(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn invoke_unary(
        &self,
        _options: &CallOptions,
        method: &MethodDescriptor,
        message: DynamicMessage,
    ) -> Result<DynamicMessage, TransportError> {
        self.open();
        delay(self.latency).await;
        Ok(message.retyped(method.output_name.as_str()))
    }

    async fn open_client_stream(
        &self,
        _options: &CallOptions,
        method: &MethodDescriptor,
    ) -> Result<Box<dyn ClientStream>, TransportError> {
        self.open();
        Ok(Box::new(LoopbackClientStream {
            output_name: method.output_name.clone(),
            last: None,
            latency: self.latency,
        }))
    }

    async fn open_server_stream(
        &self,
        _options: &CallOptions,
        method: &MethodDescriptor,
        message: DynamicMessage,
    ) -> Result<Box<dyn StreamReceiver>, TransportError> {
        self.open();
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is still alive, so this cannot fail.
        let _ = tx.send(message.retyped(method.output_name.as_str()));

        Ok(Box::new(LoopbackReceiver {
            rx,
            latency: self.latency,
        }))
    }

    async fn open_bidi_stream(
        &self,
        _options: &CallOptions,
        method: &MethodDescriptor,
    ) -> Result<(Box<dyn StreamSender>, Box<dyn StreamReceiver>), TransportError> {
        self.open();
        let (tx, rx) = mpsc::unbounded_channel();

        Ok((
            Box::new(LoopbackSender {
                tx: Some(tx),
                output_name: method.output_name.clone(),
            }),
            Box::new(LoopbackReceiver {
                rx,
                latency: self.latency,
            }),
        ))
    }
}

struct LoopbackClientStream {
    output_name: String,
    last: Option<DynamicMessage>,
    latency: Option<Duration>,
}

#[async_trait]
impl ClientStream for LoopbackClientStream {
    async fn send(&mut self, message: DynamicMessage) -> Result<(), TransportError> {
        self.last = Some(message);
        Ok(())
    }

    async fn close_and_receive(&mut self) -> Result<DynamicMessage, TransportError> {
        delay(self.latency).await;
        let reply = match self.last.take() {
            Some(message) => message.retyped(self.output_name.as_str()),
            None => DynamicMessage::json(self.output_name.as_str(), json!({})),
        };
        Ok(reply)
    }
}

struct LoopbackSender {
    tx: Option<mpsc::UnboundedSender<DynamicMessage>>,
    output_name: String,
}

#[async_trait]
impl StreamSender for LoopbackSender {
    async fn send(&mut self, message: DynamicMessage) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::StreamClosed)?;
        tx.send(message.retyped(self.output_name.as_str()))
            .map_err(|_| TransportError::StreamClosed)
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

struct LoopbackReceiver {
    rx: mpsc::UnboundedReceiver<DynamicMessage>,
    latency: Option<Duration>,
}

#[async_trait]
impl StreamReceiver for LoopbackReceiver {
    async fn receive(&mut self) -> Result<Option<DynamicMessage>, TransportError> {
        let message = self.rx.recv().await;
        if message.is_some() {
            delay(self.latency).await;
        }
        Ok(message)
    }
}
