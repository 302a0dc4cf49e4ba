//! Dynamic request and response messages

use bytes::Bytes;
use serde_json::Value;

/// Body of a dynamic message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A JSON object, field name to value
    Json(Value),
    /// One already-encoded wire message
    Binary(Bytes),
}

/// A message whose schema is only known at runtime
///
/// Carries the type name from the method descriptor plus the decoded body.
/// Transports encode it to the wire however their schema source dictates.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    type_name: String,
    payload: Payload,
}

impl DynamicMessage {
    /// Create a message from a JSON value
    pub fn json(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            payload: Payload::Json(value),
        }
    }

    /// Create a message from encoded bytes
    pub fn binary(type_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            type_name: type_name.into(),
            payload: Payload::Binary(bytes.into()),
        }
    }

    /// Message type name (e.g. `HelloRequest`)
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Message body
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Field names when the body is a JSON object
    pub fn field_names(&self) -> Vec<&str> {
        match &self.payload {
            Payload::Json(Value::Object(map)) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Same body under a different type name
    pub fn retyped(self, type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            payload: self.payload,
        }
    }
}
