//! Message and connection-state types.

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;

// =============================================================================
// Messages
// =============================================================================

/// A unit of application data carried over the connector.
///
/// Exactly two payload kinds exist: text (e.g. JSON control and event
/// frames) and binary (e.g. raw audio chunks). The connector treats both as
/// opaque. A message is immutable once constructed and is owned by exactly
/// one queue at a time until it is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    /// Short payload-kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Text(_) => "text",
            Message::Binary(_) => "binary",
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Message::Text(_) => None,
            Message::Binary(data) => Some(data),
        }
    }
}

// =============================================================================
// Connection state
// =============================================================================

/// Lifecycle state of a connector.
///
/// `Disconnected` and `Closed` are terminal: no transition ever leaves them.
/// A connector wanting to reconnect must be re-created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake in flight; nothing flows yet.
    Connecting = 0,
    /// Transport open; sends and receives both active.
    Connected = 1,
    /// Transport lost unexpectedly (error or unclean close).
    Disconnected = 2,
    /// Transport closed deliberately, or cleanly by the peer.
    Closed = 3,
}

impl ConnectionState {
    /// True while the connection is being established or is established.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    /// True for the two states no transition ever leaves.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Disconnected,
            _ => ConnectionState::Closed,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Atomic cell holding a [`ConnectionState`].
///
/// All transitions go through compare-and-set so that concurrent writers
/// (the background task setting `Connected`/`Disconnected`, the caller
/// setting `Closed`) resolve deterministically and terminal states stick.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(initial: ConnectionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Unconditional store. Only used for the pre-connect `Closed` →
    /// `Connecting` step, which is serialized by the start flag.
    pub(crate) fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Compare-and-set transition. Returns true if the transition applied.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move any non-terminal state to `to`. Returns the state that was
    /// actually in effect afterwards.
    fn settle(&self, to: ConnectionState) -> ConnectionState {
        let mut current = self.load();
        while !current.is_terminal() {
            if self.transition(current, to) {
                return to;
            }
            current = self.load();
        }
        current
    }

    /// Mark a deliberate close. Terminal states are left untouched.
    pub(crate) fn close(&self) -> ConnectionState {
        self.settle(ConnectionState::Closed)
    }

    /// Mark a transport fault. Terminal states are left untouched.
    pub(crate) fn fault(&self) -> ConnectionState {
        self.settle(ConnectionState::Disconnected)
    }
}
