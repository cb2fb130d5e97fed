//! The duplex connector.
//!
//! One `DuplexConnector` owns one logical streaming connection. All blocking
//! I/O happens on a single background tokio task that exclusively owns the
//! transport; the caller's side never blocks. Messages cross the boundary
//! through two mutex-guarded FIFO queues:
//!
//! - outbound: `send` appends under lock and signals the background task,
//!   which drains one message at a time and writes it to the wire;
//! - inbound: the background task appends received frames under lock and
//!   raises a flag that the receive pump polls (zero timeout) once per
//!   cooperative tick, draining the whole queue and invoking subscribers in
//!   receipt order.
//!
//! The background task and the pump are started lazily by the first `send`
//! and at most once per connector. Failures never cross the boundary as
//! errors; they surface as a state transition observed by the pump, which
//! then fires `on_close` exactly once.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tracing::{debug, info, trace, warn};

use super::config::ConnectorConfig;
use super::events::{EventKind, Handlers, Subscription};
use super::messages::{ConnectionState, Message, StateCell};
use super::ConnectorError;
use crate::core::scheduler::{IntervalScheduler, Tick, TickScheduler, TickTask};
use crate::core::transport::{Frame, HandshakeRequest, Transport, TransportPair, WsTransport};

type MessageHandler = dyn Fn(&Message) + Send + Sync;
type CloseHandler = dyn Fn(ConnectionState) + Send + Sync;

/// Shared core of a connector, referenced by the caller handle, the
/// background I/O task and the receive pump.
struct ConnectorShared {
    request: HandshakeRequest,
    send_wake_timeout: Duration,
    keepalive: Option<Duration>,

    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn TickScheduler>,

    state: StateCell,
    outbound: Mutex<VecDeque<Message>>,
    inbound: Mutex<VecDeque<Message>>,
    send_signal: Notify,
    receive_signal: AtomicBool,

    message_handlers: Handlers<MessageHandler>,
    close_handlers: Handlers<CloseHandler>,

    io_started: AtomicBool,
    io_finished: AtomicBool,
    pump_started: AtomicBool,
    close_fired: AtomicBool,
    shutdown_requested: AtomicBool,
    io_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectorShared {
    fn push_inbound(&self, message: Message) {
        self.inbound.lock().push_back(message);
        self.receive_signal.store(true, Ordering::Release);
    }

    fn pop_outbound(&self) -> Option<Message> {
        self.outbound.lock().pop_front()
    }
}

/// A bidirectional, ordered message stream over a network transport.
///
/// See the [module docs](self) for the threading model. All methods take
/// `&self`; share the connector across producers by wrapping it in an `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use voxlink::{ConnectorConfig, Credentials, DuplexConnector, Message};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ConnectorConfig::new("https://stream.example.com/v1/recognize")
///         .with_credentials(Credentials::bearer("access-token"));
///     let connector = DuplexConnector::new(config)?;
///
///     connector.on_message(|message| {
///         if let Some(text) = message.as_text() {
///             println!("event: {text}");
///         }
///     });
///     connector.on_close(|state| println!("session over: {state}"));
///
///     // first send starts the background task and the handshake
///     connector.send(Message::text(r#"{"action":"start"}"#))?;
///     connector.send(Message::binary(vec![0u8; 3200]))?;
///
///     connector.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct DuplexConnector {
    shared: Arc<ConnectorShared>,
    config: ConnectorConfig,
}

impl DuplexConnector {
    /// Create a connector using the production WebSocket transport and the
    /// default interval scheduler.
    pub fn new(config: ConnectorConfig) -> Result<Self, ConnectorError> {
        Self::with_parts(
            config,
            Arc::new(WsTransport::new()),
            Arc::new(IntervalScheduler::default()),
        )
    }

    /// Create a connector over an arbitrary transport and scheduler. This is
    /// the seam tests use to run the connector headless.
    pub fn with_parts(
        config: ConnectorConfig,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn TickScheduler>,
    ) -> Result<Self, ConnectorError> {
        let url = config.validated_url()?;
        let request = HandshakeRequest {
            url,
            credentials: config.credentials.clone(),
            headers: config.headers.clone(),
            connect_timeout: config.connect_timeout,
        };

        Ok(Self {
            shared: Arc::new(ConnectorShared {
                request,
                send_wake_timeout: config.send_wake_timeout,
                keepalive: config.keepalive,
                transport,
                scheduler,
                // pre-connect state; the first send moves it to Connecting
                state: StateCell::new(ConnectionState::Closed),
                outbound: Mutex::new(VecDeque::new()),
                inbound: Mutex::new(VecDeque::new()),
                send_signal: Notify::new(),
                receive_signal: AtomicBool::new(false),
                message_handlers: Handlers::new(),
                close_handlers: Handlers::new(),
                io_started: AtomicBool::new(false),
                io_finished: AtomicBool::new(false),
                pump_started: AtomicBool::new(false),
                close_fired: AtomicBool::new(false),
                shutdown_requested: AtomicBool::new(false),
                io_handle: Mutex::new(None),
            }),
            config,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The endpoint URL after scheme rewriting.
    pub fn endpoint_url(&self) -> &str {
        &self.shared.request.url
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Messages waiting in the outbound queue.
    pub fn pending_outbound(&self) -> usize {
        self.shared.outbound.lock().len()
    }

    // -- events ---------------------------------------------------------------

    /// Subscribe to inbound messages. The handler runs on the cooperative
    /// scheduler, once per message, in receipt order - never on the
    /// background task.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.shared.message_handlers.subscribe(Arc::new(handler));
        Subscription {
            id,
            kind: EventKind::Message,
        }
    }

    /// Subscribe to the end of the connection. Fires exactly once per
    /// connector lifetime, on the cooperative scheduler, with the final
    /// state (`Closed` for a deliberate or clean end, `Disconnected` for a
    /// fault).
    pub fn on_close<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.shared.close_handlers.subscribe(Arc::new(handler));
        Subscription {
            id,
            kind: EventKind::Close,
        }
    }

    /// Remove a previously registered handler.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        match subscription.kind {
            EventKind::Message => self.shared.message_handlers.unsubscribe(subscription.id),
            EventKind::Close => self.shared.close_handlers.unsubscribe(subscription.id),
        }
    }

    // -- sending --------------------------------------------------------------

    /// Queue a message and wake the sender. On the first call this starts
    /// the background I/O task (moving the state to `Connecting`) and
    /// schedules the receive pump; both happen at most once per connector.
    ///
    /// Never blocks. A failed connection attempt is reported through the
    /// state machine and `on_close`, not through this call. Once the
    /// connector has been closed or has lost its connection the call is
    /// rejected; construct a new connector to reconnect.
    pub fn send(&self, message: Message) -> Result<(), ConnectorError> {
        self.dispatch(message, false)
    }

    /// Queue a message without waking the sender or starting anything. Use
    /// to batch several messages before a flushing [`send`](Self::send).
    pub fn enqueue(&self, message: Message) -> Result<(), ConnectorError> {
        self.dispatch(message, true)
    }

    /// Convenience: send a text message.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectorError> {
        self.send(Message::text(text))
    }

    /// Convenience: send a binary message (e.g. an audio chunk).
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), ConnectorError> {
        self.send(Message::binary(data))
    }

    fn dispatch(&self, message: Message, enqueue_only: bool) -> Result<(), ConnectorError> {
        let shared = &self.shared;

        // Reject once the connector is dead: after close(), after the
        // background task exited, or after a fault. `Disconnected` can only
        // mean a dead connection (the pre-connect state is `Closed`), so the
        // state check stays race-free against a concurrent lazy start.
        let state = shared.state.load();
        if shared.shutdown_requested.load(Ordering::Acquire)
            || shared.io_finished.load(Ordering::Acquire)
            || state == ConnectionState::Disconnected
        {
            return Err(ConnectorError::Terminated(state));
        }

        trace!(
            kind = message.kind(),
            len = message.len(),
            enqueue_only,
            "queueing outbound message"
        );
        shared.outbound.lock().push_back(message);

        if enqueue_only {
            return Ok(());
        }

        shared.send_signal.notify_one();
        self.ensure_io_task();
        self.ensure_pump();
        Ok(())
    }

    // -- lifecycle ------------------------------------------------------------

    /// Request a deliberate close.
    ///
    /// Advisory and non-blocking: the state moves to `Closed` and the
    /// background task observes it at its next wake (bounded by the sender
    /// wake timeout), performs the close handshake and exits. Safe to call
    /// any number of times. Also guarantees the receive pump is scheduled so
    /// `on_close` fires even for a connector that never sent anything.
    pub fn close(&self) {
        let shared = &self.shared;
        if !shared.shutdown_requested.swap(true, Ordering::AcqRel) {
            debug!(url = %shared.request.url, "close requested");
        }
        shared.state.close();
        shared.send_signal.notify_one();
        self.ensure_pump();
    }

    /// Await termination of the background I/O task. Returns immediately if
    /// it never started or already finished.
    pub async fn join(&self) {
        let handle = self.shared.io_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// [`close`](Self::close) followed by [`join`](Self::join).
    pub async fn shutdown(&self) {
        self.close();
        self.join().await;
    }

    fn ensure_io_task(&self) {
        let shared = &self.shared;
        if shared
            .io_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        shared.state.store(ConnectionState::Connecting);
        // a close may have raced the start; do not spawn for a dead connector
        if shared.shutdown_requested.load(Ordering::Acquire) {
            shared.state.close();
            return;
        }

        debug!(url = %shared.request.url, "starting transport task");
        let handle = tokio::spawn(run_io(shared.clone()));
        *shared.io_handle.lock() = Some(handle);
    }

    fn ensure_pump(&self) {
        let shared = &self.shared;
        if shared
            .pump_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            shared.scheduler.schedule_recurring(Box::new(ReceivePump {
                shared: shared.clone(),
            }));
        }
    }
}

impl Drop for DuplexConnector {
    fn drop(&mut self) {
        // advisory only: the background task winds down on its own
        self.shared.shutdown_requested.store(true, Ordering::Release);
        self.shared.state.close();
        self.shared.send_signal.notify_one();
    }
}

// =============================================================================
// Background I/O task
// =============================================================================

async fn run_io(shared: Arc<ConnectorShared>) {
    run_session(&shared).await;
    shared.io_finished.store(true, Ordering::Release);
}

/// The only code that ever touches the transport. Connects, then multiplexes
/// outbound drains, inbound frames and keep-alive probes until the state
/// leaves `Connected`.
async fn run_session(shared: &ConnectorShared) {
    let pair = match shared.transport.connect(shared.request.clone()).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(url = %shared.request.url, error = %e, "transport handshake failed");
            shared.state.fault();
            shared.outbound.lock().clear();
            return;
        }
    };
    let TransportPair {
        mut sink,
        mut stream,
    } = pair;

    if !shared
        .state
        .transition(ConnectionState::Connecting, ConnectionState::Connected)
    {
        // close() won the race during the handshake
        debug!("connector closed during handshake");
        let _ = sink.close().await;
        return;
    }
    info!(url = %shared.request.url, "transport connected");

    let keepalive_idle = shared.keepalive;
    let mut keepalive = tokio::time::interval(keepalive_idle.unwrap_or(Duration::from_secs(3600)));
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_write = Instant::now();

    'io: while shared.state.load() == ConnectionState::Connected {
        tokio::select! {
            biased;

            // Wake on a send signal, or periodically to observe a close
            // request even when the queue stays empty.
            _ = timeout(shared.send_wake_timeout, shared.send_signal.notified()) => {
                while shared.state.load() == ConnectionState::Connected {
                    let Some(message) = shared.pop_outbound() else { break };
                    let kind = message.kind();
                    let len = message.len();
                    if let Err(e) = sink.send(Frame::from(message)).await {
                        warn!(error = %e, "failed to write frame");
                        shared.state.fault();
                        break 'io;
                    }
                    last_write = Instant::now();
                    trace!(kind, len, "frame written");
                }
            }

            item = stream.next() => {
                match item {
                    Some(Ok(Frame::Text(text))) => shared.push_inbound(Message::Text(text)),
                    Some(Ok(Frame::Binary(data))) => shared.push_inbound(Message::Binary(data)),
                    Some(Ok(Frame::Ping(_))) => {
                        // transport layers answer pings themselves
                    }
                    Some(Ok(Frame::Close { clean })) => {
                        info!(clean, "peer closed the stream");
                        if clean {
                            shared.state.transition(
                                ConnectionState::Connected,
                                ConnectionState::Closed,
                            );
                        } else {
                            shared.state.fault();
                        }
                        break 'io;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "transport fault");
                        shared.state.fault();
                        break 'io;
                    }
                    None => {
                        info!("transport stream ended");
                        shared
                            .state
                            .transition(ConnectionState::Connected, ConnectionState::Closed);
                        break 'io;
                    }
                }
            }

            _ = keepalive.tick(), if keepalive_idle.is_some() => {
                let idle = keepalive_idle.unwrap_or_default();
                if last_write.elapsed() >= idle {
                    if let Err(e) = sink.send(Frame::Ping(Bytes::new())).await {
                        warn!(error = %e, "failed to send keep-alive ping");
                        shared.state.fault();
                        break 'io;
                    }
                    last_write = Instant::now();
                    trace!("sent keep-alive ping");
                }
            }
        }
    }

    match shared.state.load() {
        ConnectionState::Closed => {
            // deliberate or clean end: complete the close handshake
            let _ = sink.close().await;
            info!(url = %shared.request.url, "transport closed");
        }
        state => {
            // fault: undelivered outbound messages are connection-level loss
            let dropped = {
                let mut queue = shared.outbound.lock();
                let dropped = queue.len();
                queue.clear();
                dropped
            };
            info!(%state, dropped, "transport terminated");
        }
    }
}

// =============================================================================
// Receive pump
// =============================================================================

/// Cooperative task delivering inbound messages to subscribers.
///
/// Once per tick: a zero-timeout check of the receive signal, a full drain
/// of the inbound queue in FIFO order, then a state check. When the state
/// has left {Connecting, Connected} the pump delivers any frames that raced
/// in ahead of the terminal transition, fires `on_close` exactly once and
/// unschedules itself.
struct ReceivePump {
    shared: Arc<ConnectorShared>,
}

impl ReceivePump {
    fn deliver(&self) {
        // move messages out under the lock, dispatch after releasing it
        let drained: Vec<Message> = {
            let mut queue = self.shared.inbound.lock();
            queue.drain(..).collect()
        };
        for message in drained {
            trace!(
                kind = message.kind(),
                len = message.len(),
                "delivering inbound message"
            );
            for handler in self.shared.message_handlers.snapshot() {
                handler(&message);
            }
        }
    }
}

impl TickTask for ReceivePump {
    fn tick(&mut self) -> Tick {
        if self.shared.receive_signal.swap(false, Ordering::AcqRel) {
            self.deliver();
        }

        let state = self.shared.state.load();
        if state.is_active() {
            return Tick::Continue;
        }

        // terminal: one final drain so nothing received before the
        // transition is lost, then the one-shot close notification
        self.deliver();
        if !self.shared.close_fired.swap(true, Ordering::AcqRel) {
            debug!(%state, "connector finished");
            for handler in self.shared.close_handlers.snapshot() {
                handler(state);
            }
        }
        Tick::Done
    }
}
