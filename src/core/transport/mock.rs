//! Scripted in-memory transport for headless tests.
//!
//! `MockTransport` stands in for the WebSocket layer so the full connector
//! state machine can be exercised without sockets: tests inspect every frame
//! the connector wrote, inject inbound frames, gate the handshake, and fault
//! the stream mid-session.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Sink, Stream};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use super::{Frame, HandshakeRequest, Transport, TransportError, TransportPair};

#[derive(Debug, Clone)]
enum HandshakeMode {
    /// Complete the handshake as soon as `connect` is called.
    Immediate,
    /// Park `connect` until `release_handshake` is called.
    Held,
    /// Reject the handshake.
    Fail(String),
}

#[derive(Default)]
struct MockState {
    connect_calls: AtomicUsize,
    last_request: Mutex<Option<HandshakeRequest>>,
    mode: Mutex<Option<HandshakeMode>>,
    gate: Notify,
    written: Mutex<Vec<Frame>>,
    sink_closed: AtomicBool,
    fail_next_write: Mutex<Option<String>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>>,
}

/// Scripted [`Transport`] implementation for tests.
///
/// Clones share state, so a test can keep one handle while the connector
/// owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // -- handshake scripting --------------------------------------------------

    /// Park the next `connect` call until [`release_handshake`](Self::release_handshake).
    pub fn hold_handshake(&self) {
        *self.state.mode.lock() = Some(HandshakeMode::Held);
    }

    /// Let a held handshake complete.
    pub fn release_handshake(&self) {
        self.state.gate.notify_one();
    }

    /// Make the next `connect` call fail with the given reason.
    pub fn fail_handshake(&self, reason: &str) {
        *self.state.mode.lock() = Some(HandshakeMode::Fail(reason.to_string()));
    }

    // -- inbound scripting ----------------------------------------------------

    /// Inject an inbound text frame. No-op before the handshake completes.
    pub fn push_text(&self, text: &str) {
        self.push_frame(Frame::Text(text.to_string()));
    }

    /// Inject an inbound binary frame.
    pub fn push_binary(&self, data: impl Into<Bytes>) {
        self.push_frame(Frame::Binary(data.into()));
    }

    pub fn push_frame(&self, frame: Frame) {
        if let Some(tx) = self.state.inbound.lock().as_ref() {
            let _ = tx.send(Ok(frame));
        }
    }

    /// Inject a mid-stream I/O fault.
    pub fn fail_stream(&self, reason: &str) {
        if let Some(tx) = self.state.inbound.lock().as_ref() {
            let _ = tx.send(Err(TransportError::Network(reason.to_string())));
        }
    }

    /// Deliver a peer close frame; `clean` selects orderly vs abrupt close.
    pub fn close_stream(&self, clean: bool) {
        self.push_frame(Frame::Close { clean });
    }

    /// End the inbound stream without a close frame (orderly stream end).
    pub fn end_stream(&self) {
        self.state.inbound.lock().take();
    }

    // -- outbound scripting ---------------------------------------------------

    /// Make the next write through the sink fail.
    pub fn fail_next_write(&self, reason: &str) {
        *self.state.fail_next_write.lock() = Some(reason.to_string());
    }

    // -- observations ---------------------------------------------------------

    /// Number of `connect` calls observed.
    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    /// The handshake request passed to the most recent `connect` call.
    pub fn last_request(&self) -> Option<HandshakeRequest> {
        self.state.last_request.lock().clone()
    }

    /// Every frame written through the sink, in write order.
    pub fn written(&self) -> Vec<Frame> {
        self.state.written.lock().clone()
    }

    /// Text payloads written through the sink, in write order.
    pub fn written_text(&self) -> Vec<String> {
        self.written()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// True once the connector closed the sink (graceful close frame).
    pub fn sink_closed(&self) -> bool {
        self.state.sink_closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn connect(&self, request: HandshakeRequest) -> Result<TransportPair, TransportError> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.last_request.lock() = Some(request);

        let mode = self
            .state
            .mode
            .lock()
            .take()
            .unwrap_or(HandshakeMode::Immediate);
        match mode {
            HandshakeMode::Immediate => {}
            HandshakeMode::Held => self.state.gate.notified().await,
            HandshakeMode::Fail(reason) => return Err(TransportError::Handshake(reason)),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.inbound.lock() = Some(tx);

        Ok(TransportPair {
            sink: Box::pin(MockSink {
                state: self.state.clone(),
            }),
            stream: Box::pin(MockStream { rx }),
        })
    }
}

struct MockSink {
    state: Arc<MockState>,
}

impl Sink<Frame> for MockSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: Frame) -> Result<(), Self::Error> {
        if let Some(reason) = self.state.fail_next_write.lock().take() {
            return Err(TransportError::Network(reason));
        }
        self.state.written.lock().push(frame);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.state.sink_closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

impl Stream for MockStream {
    type Item = Result<Frame, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
