//! voxlink - duplex streaming transport for real-time voice clients.
//!
//! This crate provides the transport primitive underlying any client that
//! streams audio or events in real time: a [`DuplexConnector`] that owns one
//! bidirectional streaming connection, isolates the caller's single-threaded
//! execution context from blocking network I/O, and hands messages across the
//! thread boundary through mutex-guarded FIFO queues.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌───────────────────┐
//! │   send()     │────▶│ outbound queue │────▶│  I/O task (tokio) │──▶ wire
//! └──────────────┘     └────────────────┘     └─────────┬─────────┘
//!                                                       │
//!                      ┌────────────────┐               │
//!                      │ inbound queue  │◀──────────────┘
//!                      └───────┬────────┘
//!                              │ drained once per tick
//!                      ┌───────▼────────┐
//!                      │  receive pump  │────▶ on_message / on_close
//!                      └────────────────┘
//! ```
//!
//! The wire side is a pluggable [`Transport`]; production code uses the
//! WebSocket implementation ([`WsTransport`]), tests use [`MockTransport`].
//! Inbound delivery runs on a cooperative [`TickScheduler`] so a frame-loop
//! style host (or a test driving [`ManualScheduler`] by hand) consumes
//! messages without ever blocking.

pub mod core;
pub mod utils;

// Re-export commonly used items for convenience
pub use core::connector::{
    ConnectionState, ConnectorConfig, ConnectorError, Credentials, DuplexConnector, Message,
    Subscription,
};
pub use core::scheduler::{IntervalScheduler, ManualScheduler, Tick, TickScheduler, TickTask};
pub use core::transport::{
    Frame, HandshakeRequest, MockTransport, Transport, TransportError, TransportPair, WsTransport,
};
pub use utils::endpoint::{EndpointError, compose_endpoint, fixup_url};
