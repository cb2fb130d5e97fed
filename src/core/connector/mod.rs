//! Duplex connector: one bidirectional, ordered message stream.
//!
//! # Lifecycle
//!
//! A connector is constructed in a pre-connect `Closed` state. The first
//! [`send`](DuplexConnector::send) moves it to `Connecting`, spawns the
//! background I/O task and schedules the receive pump; a successful
//! handshake moves it to `Connected`. The connection ends in exactly one of
//! two terminal states:
//!
//! - `Closed` - deliberate [`close`](DuplexConnector::close) or a clean
//!   peer-initiated close;
//! - `Disconnected` - handshake failure or a mid-stream transport fault.
//!
//! Terminal states are sticky. There is no reconnect: sends against a dead
//! connector are rejected with [`ConnectorError::Terminated`] and the caller
//! constructs a fresh connector instead. Subscribers learn about the end of
//! the session through the one-shot `on_close` event, never through an
//! exception crossing the thread boundary.

mod client;
mod config;
mod events;
mod messages;

#[cfg(test)]
mod tests;

pub use client::DuplexConnector;
pub use config::{
    ConnectorConfig, Credentials, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SEND_WAKE_TIMEOUT,
};
pub use events::Subscription;
pub use messages::{ConnectionState, Message};

use thiserror::Error;

/// Errors returned directly to the caller.
///
/// Transport-level failures are never returned here; they surface
/// asynchronously as a `Disconnected` state transition and the `on_close`
/// event.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The configuration is unusable (bad URL, zero timeout, ...).
    #[error("invalid connector configuration: {0}")]
    Configuration(String),

    /// The connector was closed or lost its connection; construct a new
    /// connector to reconnect.
    #[error("connector terminated in state {0}; construct a new connector to reconnect")]
    Terminated(ConnectionState),
}
