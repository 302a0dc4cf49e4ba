//! Turning raw payload bytes into dynamic messages

use bytes::{Buf, Bytes};
use serde_json::Value;

use crate::message::DynamicMessage;
use crate::method::MethodDescriptor;

/// Payload decoding errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not valid JSON
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A JSON document was not an object (or an array of objects)
    #[error("expected a JSON object for {type_name}, found {found}")]
    NotAnObject {
        /// Message type being decoded
        type_name: String,
        /// Kind of JSON value found instead
        found: &'static str,
    },

    /// A length delimiter could not be read
    #[error("invalid length delimiter: {0}")]
    Delimiter(#[from] prost::DecodeError),

    /// A frame announces more bytes than remain
    #[error("truncated binary frame: need {expected} bytes, {remaining} remaining")]
    Truncated {
        /// Announced frame length
        expected: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },
}

/// Capability that turns payload bytes into messages of the method's input type
pub trait MessageCodec: Send + Sync {
    /// Decode JSON text into zero or more input messages
    fn decode_json(
        &self,
        method: &MethodDescriptor,
        data: &[u8],
    ) -> Result<Vec<DynamicMessage>, CodecError>;

    /// Decode a binary payload into zero or more input messages
    fn decode_binary(
        &self,
        method: &MethodDescriptor,
        data: &[u8],
    ) -> Result<Vec<DynamicMessage>, CodecError>;
}

/// Default codec
///
/// JSON input may be a single object, an array of objects, or several
/// concatenated documents. Binary input is a sequence of varint
/// length-delimited frames, one message per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a codec
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for JsonCodec {
    fn decode_json(
        &self,
        method: &MethodDescriptor,
        data: &[u8],
    ) -> Result<Vec<DynamicMessage>, CodecError> {
        let mut messages = Vec::new();

        for document in serde_json::Deserializer::from_slice(data).into_iter::<Value>() {
            match document? {
                Value::Array(items) => {
                    for item in items {
                        messages.push(object_message(method, item)?);
                    }
                }
                other => messages.push(object_message(method, other)?),
            }
        }

        Ok(messages)
    }

    fn decode_binary(
        &self,
        method: &MethodDescriptor,
        data: &[u8],
    ) -> Result<Vec<DynamicMessage>, CodecError> {
        let mut buf = data;
        let mut messages = Vec::new();

        while buf.has_remaining() {
            let len = prost::decode_length_delimiter(&mut buf)?;
            if len > buf.remaining() {
                return Err(CodecError::Truncated {
                    expected: len,
                    remaining: buf.remaining(),
                });
            }
            let frame = Bytes::copy_from_slice(&buf[..len]);
            buf.advance(len);
            messages.push(DynamicMessage::binary(&method.input_name, frame));
        }

        Ok(messages)
    }
}

fn object_message(method: &MethodDescriptor, value: Value) -> Result<DynamicMessage, CodecError> {
    let found = match &value {
        Value::Object(_) => return Ok(DynamicMessage::json(&method.input_name, value)),
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "nested array",
    };

    Err(CodecError::NotAnObject {
        type_name: method.input_name.clone(),
        found,
    })
}
