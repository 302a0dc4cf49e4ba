//! Integration tests for the Worker module

use super::*;
use crate::codec::{CodecError, JsonCodec, MessageCodec};
use crate::config::RunConfig;
use crate::error::CallError;
use crate::message::{DynamicMessage, Payload};
use crate::method::MethodDescriptor;
use crate::traits::{
    CallOptions, ClientStream, StreamReceiver, StreamSender, Transport, TransportError,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Mock Transport
// ============================================================================

/// What the mock observed, shared with the streams it hands out
#[derive(Default)]
struct Observed {
    opened: AtomicUsize,
    sent: Mutex<Vec<DynamicMessage>>,
    metadata: Mutex<Vec<HashMap<String, String>>>,
    close_and_receive: AtomicUsize,
    close_send: AtomicUsize,
    drained: AtomicBool,
}

impl Observed {
    fn sent_names(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| match m.payload() {
                Payload::Json(v) => v["name"].as_str().unwrap_or_default().to_string(),
                Payload::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            })
            .collect()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[derive(Default)]
struct MockTransport {
    observed: Arc<Observed>,
    delay: Option<Duration>,
    /// Client streams report `StreamClosed` once this many messages were sent
    close_after: Option<usize>,
    /// Bidi sends fail once this many messages were sent
    fail_send_after: Option<usize>,
    /// Messages each response stream yields before ending
    responses: usize,
    /// Pause between streamed responses
    response_gap: Option<Duration>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            responses: 1,
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_close_after(mut self, n: usize) -> Self {
        self.close_after = Some(n);
        self
    }

    fn with_fail_send_after(mut self, n: usize) -> Self {
        self.fail_send_after = Some(n);
        self
    }

    fn with_responses(mut self, n: usize, gap: Duration) -> Self {
        self.responses = n;
        self.response_gap = Some(gap);
        self
    }

    fn open(&self, options: &CallOptions) {
        self.observed.opened.fetch_add(1, Ordering::SeqCst);
        self.observed
            .metadata
            .lock()
            .unwrap()
            .push(options.metadata.clone());
    }

    fn receiver(&self) -> Box<dyn StreamReceiver> {
        Box::new(MockReceiver {
            observed: Arc::clone(&self.observed),
            remaining: self.responses,
            gap: self.response_gap,
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke_unary(
        &self,
        options: &CallOptions,
        method: &MethodDescriptor,
        message: DynamicMessage,
    ) -> Result<DynamicMessage, TransportError> {
        self.open(options);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.observed.sent.lock().unwrap().push(message.clone());
        Ok(message.retyped(method.output_name.as_str()))
    }

    async fn open_client_stream(
        &self,
        options: &CallOptions,
        method: &MethodDescriptor,
    ) -> Result<Box<dyn ClientStream>, TransportError> {
        self.open(options);
        Ok(Box::new(MockClientStream {
            observed: Arc::clone(&self.observed),
            close_after: self.close_after,
            sent: 0,
            output_name: method.output_name.clone(),
        }))
    }

    async fn open_server_stream(
        &self,
        options: &CallOptions,
        _method: &MethodDescriptor,
        message: DynamicMessage,
    ) -> Result<Box<dyn StreamReceiver>, TransportError> {
        self.open(options);
        self.observed.sent.lock().unwrap().push(message);
        Ok(self.receiver())
    }

    async fn open_bidi_stream(
        &self,
        options: &CallOptions,
        _method: &MethodDescriptor,
    ) -> Result<(Box<dyn StreamSender>, Box<dyn StreamReceiver>), TransportError> {
        self.open(options);
        let sender = MockSender {
            observed: Arc::clone(&self.observed),
            fail_after: self.fail_send_after,
            sent: 0,
        };
        Ok((Box::new(sender), self.receiver()))
    }
}

struct MockClientStream {
    observed: Arc<Observed>,
    close_after: Option<usize>,
    sent: usize,
    output_name: String,
}

#[async_trait]
impl ClientStream for MockClientStream {
    async fn send(&mut self, message: DynamicMessage) -> Result<(), TransportError> {
        if self.close_after == Some(self.sent) {
            return Err(TransportError::StreamClosed);
        }
        self.sent += 1;
        self.observed.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close_and_receive(&mut self) -> Result<DynamicMessage, TransportError> {
        self.observed.close_and_receive.fetch_add(1, Ordering::SeqCst);
        Ok(DynamicMessage::json(
            self.output_name.as_str(),
            serde_json::json!({}),
        ))
    }
}

struct MockSender {
    observed: Arc<Observed>,
    fail_after: Option<usize>,
    sent: usize,
}

#[async_trait]
impl StreamSender for MockSender {
    async fn send(&mut self, message: DynamicMessage) -> Result<(), TransportError> {
        if self.fail_after == Some(self.sent) {
            return Err(TransportError::Other("connection reset".into()));
        }
        self.sent += 1;
        self.observed.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        self.observed.close_send.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockReceiver {
    observed: Arc<Observed>,
    remaining: usize,
    gap: Option<Duration>,
}

#[async_trait]
impl StreamReceiver for MockReceiver {
    async fn receive(&mut self) -> Result<Option<DynamicMessage>, TransportError> {
        if let Some(gap) = self.gap {
            tokio::time::sleep(gap).await;
        }
        if self.remaining == 0 {
            self.observed.drained.store(true, Ordering::SeqCst);
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(DynamicMessage::json("Reply", serde_json::json!({}))))
    }
}

// ============================================================================
// Mock Codec
// ============================================================================

#[derive(Default)]
struct CountingCodec {
    binary_decodes: AtomicUsize,
    json_decodes: AtomicUsize,
}

impl MessageCodec for CountingCodec {
    fn decode_json(
        &self,
        method: &MethodDescriptor,
        data: &[u8],
    ) -> Result<Vec<DynamicMessage>, CodecError> {
        self.json_decodes.fetch_add(1, Ordering::SeqCst);
        JsonCodec.decode_json(method, data)
    }

    fn decode_binary(
        &self,
        method: &MethodDescriptor,
        data: &[u8],
    ) -> Result<Vec<DynamicMessage>, CodecError> {
        self.binary_decodes.fetch_add(1, Ordering::SeqCst);
        JsonCodec.decode_binary(method, data)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn method(client_streaming: bool, server_streaming: bool) -> Arc<MethodDescriptor> {
    Arc::new(
        MethodDescriptor::parse("helloworld.Greeter/SayHello", "HelloRequest", "HelloReply")
            .unwrap()
            .with_streaming(client_streaming, server_streaming),
    )
}

fn unary() -> Arc<MethodDescriptor> {
    method(false, false)
}

fn worker(
    method: Arc<MethodDescriptor>,
    transport: Arc<MockTransport>,
    config: RunConfig,
) -> Worker {
    WorkerBuilder::new("w0")
        .method(method)
        .transport(transport)
        .config(Arc::new(config))
        .build()
        .unwrap()
}

/// A stop channel whose sender is gone; a closed channel never stops a worker
fn no_stop() -> broadcast::Receiver<()> {
    let (_tx, rx) = broadcast::channel(1);
    rx
}

fn frames(payloads: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    for payload in payloads {
        prost::encode_length_delimiter(payload.len(), &mut buf).unwrap();
        buf.extend_from_slice(payload);
    }
    buf
}

// ============================================================================
// Unary
// ============================================================================

#[tokio::test]
async fn test_unary_runs_configured_calls() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(5, 1).with_data(r#"{"name":"bob"}"#);

    let stats = worker(unary(), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 5);
    assert_eq!(stats.errors, 0);
    assert_eq!(transport.observed.opened.load(Ordering::SeqCst), 5);
    assert_eq!(transport.observed.sent_names(), vec!["bob"; 5]);
}

#[tokio::test]
async fn test_json_array_variants_follow_request_number() {
    let transport = Arc::new(MockTransport::new());
    let codec = Arc::new(CountingCodec::default());
    let config = RunConfig::new(5, 1).with_data(r#"[{"name":"a"},{"name":"b"},{"name":"c"}]"#);

    let stats = WorkerBuilder::new("w0")
        .method(unary())
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .codec(Arc::clone(&codec) as Arc<dyn MessageCodec>)
        .config(Arc::new(config))
        .build()
        .unwrap()
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 5);
    assert_eq!(transport.observed.sent_names(), vec!["a", "b", "c", "a", "b"]);
    assert_eq!(codec.json_decodes.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_payload_template_rendered_per_call() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(3, 1).with_data(r#"{"name":"{{.WorkerID}}-{{.RequestNumber}}"}"#);

    worker(unary(), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(transport.observed.sent_names(), vec!["w0-1", "w0-2", "w0-3"]);
}

#[tokio::test]
async fn test_request_numbers_continue_shared_counter() {
    let transport = Arc::new(MockTransport::new());
    let counter = Arc::new(AtomicU64::new(10));
    let config = RunConfig::new(2, 1).with_data(r#"{"name":"{{.RequestNumber}}"}"#);

    WorkerBuilder::new("w1")
        .method(unary())
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .config(Arc::new(config))
        .request_counter(Arc::clone(&counter))
        .build()
        .unwrap()
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(transport.observed.sent_names(), vec!["11", "12"]);
    assert_eq!(counter.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn test_binary_payload_decoded_once() {
    let transport = Arc::new(MockTransport::new());
    let codec = Arc::new(CountingCodec::default());
    let config = RunConfig::new(5, 1).with_binary_data(frames(&[b"first", b"second"]));

    let stats = WorkerBuilder::new("w0")
        .method(unary())
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .codec(Arc::clone(&codec) as Arc<dyn MessageCodec>)
        .config(Arc::new(config))
        .build()
        .unwrap()
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 5);
    assert_eq!(codec.binary_decodes.load(Ordering::SeqCst), 1);
    assert_eq!(codec.json_decodes.load(Ordering::SeqCst), 0);
    assert_eq!(
        transport.observed.sent_names(),
        vec!["first", "second", "first", "second", "first"]
    );
}

#[tokio::test]
async fn test_no_data_is_collected_not_fatal() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(3, 1);

    let err = worker(unary(), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap_err();

    assert_eq!(err.len(), 3);
    assert!(err.errors.iter().all(|e| matches!(e, CallError::NoData)));
    assert_eq!(err.stats.errors, 3);
    assert_eq!(transport.observed.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_payload_is_collected() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(2, 1).with_data("not json");

    let err = worker(unary(), transport, config)
        .run(no_stop())
        .await
        .unwrap_err();

    assert_eq!(err.len(), 2);
    assert!(matches!(err.errors[0], CallError::Payload(_)));
}

// ============================================================================
// Metadata, timeout, dry run
// ============================================================================

#[tokio::test]
async fn test_metadata_attached_to_call() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(2, 1)
        .with_data(r#"{"name":"bob"}"#)
        .with_metadata(r#"{"trace_id":"{{.RequestNumber}}","static":"x"}"#);

    worker(unary(), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    let metadata = transport.observed.metadata.lock().unwrap();
    assert_eq!(metadata.len(), 2);
    assert_eq!(metadata[0]["trace_id"], "1");
    assert_eq!(metadata[1]["trace_id"], "2");
    assert_eq!(metadata[1]["static"], "x");
}

#[tokio::test]
async fn test_invalid_metadata_skips_dispatch() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(1, 1)
        .with_data(r#"{"name":"bob"}"#)
        .with_metadata("[1, 2]");

    let err = worker(unary(), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap_err();

    assert!(matches!(err.errors[0], CallError::Metadata(_)));
    assert_eq!(transport.observed.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timeout_bounds_each_call() {
    let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(200)));
    let config = RunConfig::new(2, 1)
        .with_data(r#"{"name":"bob"}"#)
        .with_timeout(Some(Duration::from_millis(20)));

    let start = Instant::now();
    let err = worker(unary(), transport, config)
        .run(no_stop())
        .await
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_millis(300));
    assert_eq!(err.len(), 2);
    assert!(err
        .errors
        .iter()
        .all(|e| matches!(e, CallError::Timeout(d) if *d == Duration::from_millis(20))));
}

#[tokio::test]
async fn test_dry_run_never_dispatches() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(3, 1)
        .with_data(r#"{"name":"{{.RequestNumber}}"}"#)
        .with_dry_run(true);

    let stats = worker(unary(), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 3);
    assert_eq!(transport.observed.opened.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Pacing and stop signal
// ============================================================================

#[tokio::test]
async fn test_qps_paces_calls() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(4, 1)
        .with_data(r#"{"name":"bob"}"#)
        .with_qps(50);

    let start = Instant::now();
    let stats = worker(unary(), transport, config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 4);
    // Three waits of 20ms after the immediate first call
    assert!(start.elapsed() >= Duration::from_millis(55));
}

#[tokio::test]
async fn test_pending_stop_prevents_any_call() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(5, 1).with_data(r#"{"name":"bob"}"#);

    let (stop_tx, stop_rx) = broadcast::channel(1);
    stop_tx.send(()).unwrap();

    let stats = worker(unary(), Arc::clone(&transport), config)
        .run(stop_rx)
        .await
        .unwrap();

    assert_eq!(stats.total_calls(), 0);
    assert_eq!(transport.observed.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_takes_effect_between_calls() {
    let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(10)));
    let config = RunConfig::new(1000, 1).with_data(r#"{"name":"bob"}"#);

    let (stop_tx, stop_rx) = broadcast::channel(1);
    let handle = tokio::spawn(worker(unary(), Arc::clone(&transport), config).run(stop_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop_tx.send(()).unwrap();

    let stats = handle.await.unwrap().unwrap();
    assert!(stats.completed > 0);
    assert!(stats.completed < 1000);
    assert_eq!(
        stats.completed,
        transport.observed.opened.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_records_sent_per_call() {
    let transport = Arc::new(MockTransport::new());
    let (tx, mut rx) = mpsc::channel(16);
    let config = RunConfig::new(3, 1).with_data(r#"{"name":"bob"}"#);

    WorkerBuilder::new("w7")
        .method(unary())
        .transport(transport as Arc<dyn Transport>)
        .config(Arc::new(config))
        .record_tx(tx)
        .build()
        .unwrap()
        .run(no_stop())
        .await
        .unwrap();

    let mut numbers = Vec::new();
    while let Some(record) = rx.recv().await {
        assert_eq!(record.worker_id, "w7");
        assert!(record.is_success());
        numbers.push(record.request_number);
    }
    assert_eq!(numbers, vec![1, 2, 3]);
}

// ============================================================================
// Client streaming
// ============================================================================

#[tokio::test]
async fn test_client_stream_sends_all_then_closes() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(1, 1).with_data(r#"[{"name":"a"},{"name":"b"},{"name":"c"}]"#);

    worker(method(true, false), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(transport.observed.sent_names(), vec!["a", "b", "c"]);
    assert_eq!(transport.observed.close_and_receive.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_stream_remote_close_collects_response() {
    let transport = Arc::new(MockTransport::new().with_close_after(2));
    let config = RunConfig::new(1, 1)
        .with_data(r#"[{"name":"a"},{"name":"b"},{"name":"c"},{"name":"d"}]"#);

    let stats = worker(method(true, false), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(transport.observed.sent_count(), 2);
    assert_eq!(transport.observed.close_and_receive.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_stream_empty_input_closes_immediately() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(1, 1);

    worker(method(true, false), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(transport.observed.sent_count(), 0);
    assert_eq!(transport.observed.close_and_receive.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stream_interval_paces_messages() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(1, 1)
        .with_data(r#"[{"name":"a"},{"name":"b"},{"name":"c"}]"#)
        .with_stream_interval(Some(Duration::from_millis(15)));

    let start = Instant::now();
    worker(method(true, false), transport, config)
        .run(no_stop())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(45));
}

// ============================================================================
// Server streaming
// ============================================================================

#[tokio::test]
async fn test_server_stream_receives_until_end() {
    let transport = Arc::new(MockTransport::new().with_responses(3, Duration::from_millis(1)));
    let config = RunConfig::new(2, 1).with_data(r#"{"name":"bob"}"#);

    let stats = worker(method(false, true), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 2);
    assert_eq!(transport.observed.sent_names(), vec!["bob", "bob"]);
    assert!(transport.observed.drained.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_server_stream_without_data_fails() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(1, 1);

    let err = worker(method(false, true), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap_err();

    assert!(matches!(err.errors[0], CallError::NoData));
    assert_eq!(transport.observed.opened.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Bidirectional streaming
// ============================================================================

#[tokio::test]
async fn test_bidi_waits_for_receiver_drain() {
    let transport = Arc::new(MockTransport::new().with_responses(3, Duration::from_millis(10)));
    let config = RunConfig::new(1, 1).with_data(r#"[{"name":"a"},{"name":"b"}]"#);

    let stats = worker(method(true, true), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(transport.observed.sent_names(), vec!["a", "b"]);
    assert_eq!(transport.observed.close_send.load(Ordering::SeqCst), 1);
    assert!(transport.observed.drained.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_bidi_empty_input_closes_send_immediately() {
    let transport = Arc::new(MockTransport::new());
    let config = RunConfig::new(1, 1);

    let stats = worker(method(true, true), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(transport.observed.sent_count(), 0);
    assert_eq!(transport.observed.close_send.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bidi_send_error_still_drains() {
    let transport = Arc::new(
        MockTransport::new()
            .with_fail_send_after(1)
            .with_responses(2, Duration::from_millis(10)),
    );
    let config = RunConfig::new(1, 1).with_data(r#"[{"name":"a"},{"name":"b"},{"name":"c"}]"#);

    let err = worker(method(true, true), Arc::clone(&transport), config)
        .run(no_stop())
        .await
        .unwrap_err();

    assert!(matches!(
        &err.errors[0],
        CallError::Transport(TransportError::Other(msg)) if msg == "connection reset"
    ));
    assert_eq!(transport.observed.sent_count(), 1);
    assert!(transport.observed.drained.load(Ordering::SeqCst));
}

/// Bidi stream whose receive half ends only once the send half is closed
struct HalfCloseTransport {
    fail_send_at: usize,
    closed: Arc<AtomicBool>,
}

struct HalfCloseSender {
    tx: Option<mpsc::UnboundedSender<DynamicMessage>>,
    fail_send_at: usize,
    sent: usize,
    closed: Arc<AtomicBool>,
}

struct HalfCloseReceiver {
    rx: mpsc::UnboundedReceiver<DynamicMessage>,
}

#[async_trait]
impl StreamSender for HalfCloseSender {
    async fn send(&mut self, message: DynamicMessage) -> Result<(), TransportError> {
        if self.sent == self.fail_send_at {
            return Err(TransportError::Other("reset".into()));
        }
        self.sent += 1;
        match &self.tx {
            Some(tx) => tx.send(message).map_err(|_| TransportError::StreamClosed),
            None => Err(TransportError::StreamClosed),
        }
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StreamReceiver for HalfCloseReceiver {
    async fn receive(&mut self) -> Result<Option<DynamicMessage>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

#[async_trait]
impl Transport for HalfCloseTransport {
    fn name(&self) -> &str {
        "half-close"
    }

    async fn invoke_unary(
        &self,
        _options: &CallOptions,
        _method: &MethodDescriptor,
        _message: DynamicMessage,
    ) -> Result<DynamicMessage, TransportError> {
        Err(TransportError::Other("bidi only".into()))
    }

    async fn open_client_stream(
        &self,
        _options: &CallOptions,
        _method: &MethodDescriptor,
    ) -> Result<Box<dyn ClientStream>, TransportError> {
        Err(TransportError::Other("bidi only".into()))
    }

    async fn open_server_stream(
        &self,
        _options: &CallOptions,
        _method: &MethodDescriptor,
        _message: DynamicMessage,
    ) -> Result<Box<dyn StreamReceiver>, TransportError> {
        Err(TransportError::Other("bidi only".into()))
    }

    async fn open_bidi_stream(
        &self,
        _options: &CallOptions,
        _method: &MethodDescriptor,
    ) -> Result<(Box<dyn StreamSender>, Box<dyn StreamReceiver>), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = HalfCloseSender {
            tx: Some(tx),
            fail_send_at: self.fail_send_at,
            sent: 0,
            closed: Arc::clone(&self.closed),
        };
        Ok((Box::new(sender), Box::new(HalfCloseReceiver { rx })))
    }
}

#[tokio::test]
async fn test_bidi_send_error_half_closes_so_drain_ends() {
    let closed = Arc::new(AtomicBool::new(false));
    let transport = Arc::new(HalfCloseTransport {
        fail_send_at: 1,
        closed: Arc::clone(&closed),
    });
    let config = RunConfig::new(2, 1)
        .with_timeout(None)
        .with_data(r#"[{"name":"a"},{"name":"b"}]"#);

    let worker = WorkerBuilder::new("w0")
        .method(method(true, true))
        .transport(transport)
        .config(Arc::new(config))
        .build()
        .unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), worker.run(no_stop()))
        .await
        .expect("worker finished")
        .unwrap_err();

    // Both calls fail on their second send and the loop moves on
    assert_eq!(err.stats.errors, 2);
    assert!(err.errors.iter().all(|e| matches!(
        e,
        CallError::Transport(TransportError::Other(msg)) if msg == "reset"
    )));
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stop_during_pacing_wait_skips_next_call() {
    let transport = Arc::new(MockTransport::new());
    // 500ms between calls; the first call is immediate
    let config = RunConfig::new(3, 1)
        .with_data(r#"{"name":"bob"}"#)
        .with_qps(2);

    let (stop_tx, stop_rx) = broadcast::channel(1);
    let handle = tokio::spawn(worker(unary(), Arc::clone(&transport), config).run(stop_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(transport.observed.opened.load(Ordering::SeqCst), 1);
}
