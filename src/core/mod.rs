pub mod connector;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types for convenience
pub use connector::{
    ConnectionState, ConnectorConfig, ConnectorError, Credentials, DuplexConnector, Message,
};
pub use scheduler::{IntervalScheduler, ManualScheduler, TickScheduler};
pub use transport::{Transport, TransportError, WsTransport};
