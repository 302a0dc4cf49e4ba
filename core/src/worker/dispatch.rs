//! Streaming-shape state machines
//!
//! One function per call shape. Each drives a single call to completion over
//! the [`Transport`] and reports the first failure that matters.

use std::time::Duration;

use crate::error::CallError;
use crate::message::DynamicMessage;
use crate::method::{MethodDescriptor, StreamingShape};
use crate::traits::{CallOptions, Transport, TransportError};

/// Everything a single call needs besides its messages
pub(crate) struct CallPlan<'a> {
    pub transport: &'a dyn Transport,
    pub options: &'a CallOptions,
    pub method: &'a MethodDescriptor,
    pub request_number: u64,
    pub stream_interval: Option<Duration>,
}

impl CallPlan<'_> {
    /// Run the call according to the method's shape
    pub(crate) async fn dispatch(&self, messages: &[DynamicMessage]) -> Result<(), CallError> {
        match self.method.shape() {
            StreamingShape::Unary => self.unary(messages).await,
            StreamingShape::ClientStreaming => self.client_streaming(messages).await,
            StreamingShape::ServerStreaming => self.server_streaming(messages).await,
            StreamingShape::Bidirectional => self.bidirectional(messages).await,
        }
    }

    /// Input at `(request_number - 1) % len`, so the first call uses input 0
    fn select<'m>(&self, messages: &'m [DynamicMessage]) -> Result<&'m DynamicMessage, CallError> {
        if messages.is_empty() {
            return Err(CallError::NoData);
        }
        let index = (self.request_number.saturating_sub(1) % messages.len() as u64) as usize;
        Ok(&messages[index])
    }

    async fn pause(&self) {
        if let Some(interval) = self.stream_interval.filter(|d| !d.is_zero()) {
            tokio::time::sleep(interval).await;
        }
    }

    async fn unary(&self, messages: &[DynamicMessage]) -> Result<(), CallError> {
        let message = self.select(messages)?.clone();
        self.transport
            .invoke_unary(self.options, self.method, message)
            .await?;
        Ok(())
    }

    async fn client_streaming(&self, messages: &[DynamicMessage]) -> Result<(), CallError> {
        let mut stream = self
            .transport
            .open_client_stream(self.options, self.method)
            .await?;

        for message in messages {
            self.pause().await;
            match stream.send(message.clone()).await {
                Ok(()) => {}
                // The real status arrives with the response.
                Err(TransportError::StreamClosed) => {
                    tracing::debug!(
                        request_number = self.request_number,
                        "Client stream closed by remote, collecting response"
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        stream.close_and_receive().await?;
        Ok(())
    }

    async fn server_streaming(&self, messages: &[DynamicMessage]) -> Result<(), CallError> {
        let message = self.select(messages)?.clone();
        let mut receiver = self
            .transport
            .open_server_stream(self.options, self.method, message)
            .await?;

        while receiver.receive().await?.is_some() {}
        Ok(())
    }

    async fn bidirectional(&self, messages: &[DynamicMessage]) -> Result<(), CallError> {
        let (mut sender, mut receiver) = self
            .transport
            .open_bidi_stream(self.options, self.method)
            .await?;

        if messages.is_empty() {
            sender.close_send().await?;
            return Ok(());
        }

        // The receive half only ends once the send side is half-closed, so
        // every exit path of the send half closes it.
        let send = async {
            for message in messages {
                self.pause().await;
                match sender.send(message.clone()).await {
                    Ok(()) => {}
                    Err(TransportError::StreamClosed) => {
                        let _ = sender.close_send().await;
                        return Ok(());
                    }
                    Err(e) => {
                        let _ = sender.close_send().await;
                        return Err(e);
                    }
                }
            }
            sender.close_send().await
        };

        let receive = async {
            while receiver.receive().await?.is_some() {}
            Ok::<(), TransportError>(())
        };

        // Both halves must finish; a send failure outranks a receive failure.
        let (sent, received) = tokio::join!(send, receive);
        sent?;
        received?;
        Ok(())
    }
}
