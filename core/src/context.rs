//! Per-call template context
//!
//! A [`CallTemplateContext`] is built once for every call attempt. It carries
//! the identity of the call and the method being invoked, and renders payload
//! and metadata templates against those values.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{Local, SecondsFormat};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::method::MethodDescriptor;
use crate::template::{has_actions, MetadataError, TemplateCache, TemplateData, TemplateError, Value};

/// Values a template can reference for one call
#[derive(Debug, Serialize)]
pub struct CallTemplateContext {
    /// Id of the worker issuing the call
    pub worker_id: String,
    /// Run-wide sequence number of the call, starting at 1
    pub request_number: u64,
    /// `package.Service.Method`
    pub fully_qualified_name: String,
    /// `Method`
    pub method_name: String,
    /// `Service`
    pub service_name: String,
    /// Request message type name
    pub input_name: String,
    /// Response message type name
    pub output_name: String,
    /// Whether the method streams requests
    pub is_client_streaming: bool,
    /// Whether the method streams responses
    pub is_server_streaming: bool,
    /// Construction time, RFC 3339
    pub timestamp: String,
    /// Construction time, unix seconds
    pub timestamp_unix: i64,

    #[serde(skip)]
    rng: Mutex<StdRng>,
}

impl CallTemplateContext {
    /// Capture a context for call `request_number` of `worker_id`
    pub fn new(method: &MethodDescriptor, worker_id: impl Into<String>, request_number: u64) -> Self {
        let now = Local::now();
        let nanos = now.timestamp_nanos_opt().unwrap_or_default() as u64;

        Self {
            worker_id: worker_id.into(),
            request_number,
            fully_qualified_name: method.fully_qualified_name.clone(),
            method_name: method.name.clone(),
            service_name: method.service_name.clone(),
            input_name: method.input_name.clone(),
            output_name: method.output_name.clone(),
            is_client_streaming: method.client_streaming,
            is_server_streaming: method.server_streaming,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            timestamp_unix: now.timestamp(),
            rng: Mutex::new(StdRng::seed_from_u64(nanos ^ request_number)),
        }
    }

    /// Replace the random source, for reproducible rendering
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Render `source`, failing on any parse or evaluation error
    pub fn execute(&self, source: &str) -> Result<String, TemplateError> {
        let template = TemplateCache::global().get(source)?;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        template.render(self, &mut rng)
    }

    /// Render a payload template
    ///
    /// Empty input yields empty output. If the template cannot be rendered the
    /// source text is used unchanged.
    pub fn execute_data(&self, source: &str) -> Vec<u8> {
        if source.is_empty() {
            return Vec::new();
        }
        if !has_actions(source) {
            return source.as_bytes().to_vec();
        }

        match self.execute(source) {
            Ok(rendered) => rendered.into_bytes(),
            Err(e) => {
                tracing::trace!(error = %e, "Payload template not rendered, using literal");
                source.as_bytes().to_vec()
            }
        }
    }

    /// Render a metadata template and parse it as a JSON object of strings
    ///
    /// Empty input (or `null`) yields an empty map. Rendering failures fall
    /// back to the literal text; JSON failures are returned.
    pub fn execute_metadata(&self, source: &str) -> Result<HashMap<String, String>, MetadataError> {
        if source.is_empty() {
            return Ok(HashMap::new());
        }

        let rendered = self
            .execute(source)
            .unwrap_or_else(|_| source.to_string());
        let parsed: Option<HashMap<String, String>> = serde_json::from_str(&rendered)?;

        Ok(parsed.unwrap_or_default())
    }
}

impl TemplateData for CallTemplateContext {
    fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "WorkerID" => Value::from(self.worker_id.as_str()),
            "RequestNumber" => Value::Int(self.request_number as i64),
            "FullyQualifiedName" => Value::from(self.fully_qualified_name.as_str()),
            "MethodName" => Value::from(self.method_name.as_str()),
            "ServiceName" => Value::from(self.service_name.as_str()),
            "InputName" => Value::from(self.input_name.as_str()),
            "OutputName" => Value::from(self.output_name.as_str()),
            "IsClientStreaming" => Value::Bool(self.is_client_streaming),
            "IsServerStreaming" => Value::Bool(self.is_server_streaming),
            "Timestamp" => Value::from(self.timestamp.as_str()),
            "TimestampUnix" => Value::Int(self.timestamp_unix),
            _ => return None,
        };
        Some(value)
    }

    fn dot(&self) -> Value {
        Value::Str(format!(
            "{{{} {} {} {} {} {} {} {} {} {} {}}}",
            self.worker_id,
            self.request_number,
            self.fully_qualified_name,
            self.method_name,
            self.service_name,
            self.input_name,
            self.output_name,
            self.is_client_streaming,
            self.is_server_streaming,
            self.timestamp,
            self.timestamp_unix,
        ))
    }

    fn request_number(&self) -> u64 {
        self.request_number
    }
}
