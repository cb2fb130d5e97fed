//! Streaming-socket transport seam.
//!
//! The connector never touches a socket directly; it drives a [`Transport`],
//! which performs the authenticated handshake and yields a framed sink/stream
//! pair that the connector's background task owns exclusively. Production
//! code uses [`WsTransport`]; tests use [`MockTransport`] to run the full
//! connector state machine without a network.

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WsTransport;

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, Stream};
use thiserror::Error;

use crate::core::connector::{Credentials, Message};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by a transport implementation.
///
/// These never reach the caller as return values; the connector's background
/// task translates them into a `Disconnected` state transition.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection could not be established (DNS, TCP, TLS, upgrade,
    /// authentication rejection or connect timeout).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// I/O error on an established connection.
    #[error("network error: {0}")]
    Network(String),

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

// =============================================================================
// Wire frames
// =============================================================================

/// Wire-level unit exchanged with a transport.
///
/// A superset of [`Message`]: `Ping` and `Close` are control frames the
/// connector consumes itself and never surfaces to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame (e.g. a JSON control or event frame).
    Text(String),
    /// A binary frame (e.g. a raw audio chunk).
    Binary(Bytes),
    /// A keep-alive probe.
    Ping(Bytes),
    /// The peer ended the session; `clean` distinguishes an orderly close
    /// handshake from an abrupt teardown.
    Close { clean: bool },
}

impl Frame {
    /// Short frame-kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Close { .. } => "close",
        }
    }

    /// Payload length in bytes; zero for close frames.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) | Frame::Ping(data) => data.len(),
            Frame::Close { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert a data frame into a connector message. Control frames have no
    /// message representation.
    pub fn into_message(self) -> Option<Message> {
        match self {
            Frame::Text(text) => Some(Message::Text(text)),
            Frame::Binary(data) => Some(Message::Binary(data)),
            Frame::Ping(_) | Frame::Close { .. } => None,
        }
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(data),
        }
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Everything a transport needs to establish one session.
///
/// The URL is already rewritten to a streaming-socket scheme; credentials and
/// extra headers are attached to the upgrade request verbatim. The connector
/// never interprets either beyond handing them over.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// Endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Credentials for the `Authorization` header, if any.
    pub credentials: Option<Credentials>,
    /// Additional headers to pass on the upgrade request.
    pub headers: Vec<(String, String)>,
    /// Maximum time to wait for the handshake to complete.
    pub connect_timeout: Duration,
}

// =============================================================================
// Transport trait
// =============================================================================

/// Outbound half of an established connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of an established connection. Stream end (`None`) means the
/// peer finished an orderly close.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// The two halves of an established connection. Both are owned exclusively
/// by the connector's background task once `connect` returns.
pub struct TransportPair {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// A streaming-socket implementation providing connect/send/receive/close
/// primitives to the connector's background task.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Establish one session. Called at most once per connector lifetime.
    async fn connect(&self, request: HandshakeRequest) -> Result<TransportPair, TransportError>;
}
