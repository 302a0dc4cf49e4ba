//! Target method description

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// The four RPC call shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingShape {
    /// Single request, single response
    Unary,
    /// Request stream, single response
    ClientStreaming,
    /// Single request, response stream
    ServerStreaming,
    /// Request stream and response stream running concurrently
    Bidirectional,
}

impl std::fmt::Display for StreamingShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamingShape::Unary => write!(f, "unary"),
            StreamingShape::ClientStreaming => write!(f, "client_streaming"),
            StreamingShape::ServerStreaming => write!(f, "server_streaming"),
            StreamingShape::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

/// Description of the method under test
///
/// Supplied once per run by descriptor discovery and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// e.g. `helloworld.Greeter.SayHello`
    pub fully_qualified_name: String,
    /// e.g. `SayHello`
    pub name: String,
    /// e.g. `Greeter`
    pub service_name: String,
    /// Short name of the request message type
    pub input_name: String,
    /// Short name of the response message type
    pub output_name: String,
    /// Whether the client sends a stream of messages
    pub client_streaming: bool,
    /// Whether the server answers with a stream of messages
    pub server_streaming: bool,
}

impl MethodDescriptor {
    /// Build a descriptor from a call path such as `helloworld.Greeter/SayHello`
    /// or `helloworld.Greeter.SayHello`.
    ///
    /// Streaming flags default to unary; use [`with_streaming`](Self::with_streaming)
    /// to change them.
    pub fn parse(
        call: &str,
        input_name: impl Into<String>,
        output_name: impl Into<String>,
    ) -> BenchResult<Self> {
        let call = call.trim().trim_start_matches('/');
        let (service_path, method) = match call.rsplit_once('/') {
            Some(split) => split,
            None => call
                .rsplit_once('.')
                .ok_or_else(|| BenchError::config(format!("invalid call path: {call:?}")))?,
        };

        if service_path.is_empty() || method.is_empty() {
            return Err(BenchError::config(format!("invalid call path: {call:?}")));
        }

        let service_name = service_path
            .rsplit('.')
            .next()
            .unwrap_or(service_path)
            .to_string();

        Ok(Self {
            fully_qualified_name: format!("{service_path}.{method}"),
            name: method.to_string(),
            service_name,
            input_name: input_name.into(),
            output_name: output_name.into(),
            client_streaming: false,
            server_streaming: false,
        })
    }

    /// Set the streaming flags
    pub fn with_streaming(mut self, client_streaming: bool, server_streaming: bool) -> Self {
        self.client_streaming = client_streaming;
        self.server_streaming = server_streaming;
        self
    }

    /// Call shape derived from the streaming flags
    pub fn shape(&self) -> StreamingShape {
        match (self.client_streaming, self.server_streaming) {
            (false, false) => StreamingShape::Unary,
            (true, false) => StreamingShape::ClientStreaming,
            (false, true) => StreamingShape::ServerStreaming,
            (true, true) => StreamingShape::Bidirectional,
        }
    }
}
