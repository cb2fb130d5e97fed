//! Connector unit tests.
//!
//! These run the full connector state machine headless: `MockTransport`
//! stands in for the socket and `ManualScheduler` makes inbound delivery
//! deterministic - nothing reaches a subscriber until the test ticks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::core::scheduler::ManualScheduler;
use crate::core::transport::{Frame, MockTransport};

// =============================================================================
// Helpers
// =============================================================================

fn mock_connector() -> (DuplexConnector, MockTransport, Arc<ManualScheduler>) {
    mock_connector_with(ConnectorConfig::new("wss://mock.invalid/stream"))
}

fn mock_connector_with(
    config: ConnectorConfig,
) -> (DuplexConnector, MockTransport, Arc<ManualScheduler>) {
    let transport = MockTransport::new();
    let scheduler = Arc::new(ManualScheduler::new());
    let connector =
        DuplexConnector::with_parts(config, Arc::new(transport.clone()), scheduler.clone())
            .unwrap();
    (connector, transport, scheduler)
}

/// Poll a condition until it holds, yielding to the runtime in between.
async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for: {what}");
}

/// Collects delivered messages and close notifications.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl Recorder {
    fn attach(self: &Arc<Self>, connector: &DuplexConnector) {
        let recorder = self.clone();
        connector.on_message(move |message| {
            let entry = match message {
                Message::Text(text) => format!("text:{text}"),
                Message::Binary(data) => format!("binary:{}", data.len()),
            };
            recorder.events.lock().push(entry);
        });
        let recorder = self.clone();
        connector.on_close(move |state| {
            recorder.closes.fetch_add(1, Ordering::SeqCst);
            recorder.events.lock().push(format!("close:{state}"));
        });
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Construction and configuration
// =============================================================================

#[test]
fn test_initial_state_is_preconnect_closed() {
    let (connector, transport, scheduler) = mock_connector();
    assert_eq!(connector.state(), ConnectionState::Closed);
    assert!(!connector.is_connected());
    assert_eq!(connector.pending_outbound(), 0);
    assert_eq!(transport.connect_calls(), 0);
    assert!(scheduler.is_idle());
}

#[test]
fn test_endpoint_url_is_rewritten() {
    let (connector, _, _) =
        mock_connector_with(ConnectorConfig::new("https://stream.example.com/v1/recognize"));
    assert_eq!(
        connector.endpoint_url(),
        "wss://stream.example.com/v1/recognize"
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = DuplexConnector::new(ConnectorConfig::new("ftp://example.com/x"));
    assert!(matches!(result, Err(ConnectorError::Configuration(_))));

    let result = DuplexConnector::new(ConnectorConfig::default());
    assert!(matches!(result, Err(ConnectorError::Configuration(_))));
}

// =============================================================================
// Outbound path
// =============================================================================

#[tokio::test]
async fn test_first_send_connects_and_writes() {
    let (connector, transport, _scheduler) = mock_connector();
    transport.hold_handshake();

    connector.send(Message::text("hello")).unwrap();
    // the transition to Connecting happens synchronously inside send()
    assert_eq!(connector.state(), ConnectionState::Connecting);

    wait_until("connect call", || transport.connect_calls() == 1).await;
    transport.release_handshake();

    wait_until("connected", || connector.is_connected()).await;
    wait_until("write log", || !transport.written_text().is_empty()).await;
    assert_eq!(transport.written_text(), vec!["hello".to_string()]);
}

#[tokio::test]
async fn test_sends_before_connected_flush_in_fifo_order() {
    let (connector, transport, _scheduler) = mock_connector();
    transport.hold_handshake();

    for i in 0..5 {
        connector.send(Message::text(format!("m{i}"))).unwrap();
    }
    assert_eq!(connector.pending_outbound(), 5);
    transport.release_handshake();

    wait_until("all writes", || transport.written_text().len() == 5).await;
    assert_eq!(
        transport.written_text(),
        vec!["m0", "m1", "m2", "m3", "m4"]
    );
    assert_eq!(connector.pending_outbound(), 0);
}

#[tokio::test]
async fn test_enqueue_batches_until_flushing_send() {
    let (connector, transport, scheduler) = mock_connector();

    connector.enqueue(Message::text("a")).unwrap();
    connector.enqueue(Message::text("b")).unwrap();
    // enqueue alone starts nothing
    assert_eq!(transport.connect_calls(), 0);
    assert_eq!(connector.state(), ConnectionState::Closed);
    assert!(scheduler.is_idle());
    assert_eq!(connector.pending_outbound(), 2);

    connector.send(Message::text("c")).unwrap();
    wait_until("batched writes", || transport.written_text().len() == 3).await;
    assert_eq!(transport.written_text(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_second_send_does_not_spawn_again() {
    let (connector, transport, _scheduler) = mock_connector();
    connector.send(Message::text("one")).unwrap();
    connector.send(Message::text("two")).unwrap();

    wait_until("writes", || transport.written_text().len() == 2).await;
    assert_eq!(transport.connect_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_lose_nothing() {
    const TASKS: usize = 8;
    const PER_TASK: usize = 25;

    let (connector, transport, _scheduler) = mock_connector();
    let connector = Arc::new(connector);

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let connector = connector.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..PER_TASK {
                connector.send(Message::text(format!("t{task}-{i}"))).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    wait_until("all writes", || {
        transport.written_text().len() == TASKS * PER_TASK
    })
    .await;

    let written = transport.written_text();
    // no duplicates, nothing lost
    let unique: std::collections::HashSet<_> = written.iter().collect();
    assert_eq!(unique.len(), TASKS * PER_TASK);

    // per-producer FIFO order is preserved
    for task in 0..TASKS {
        let prefix = format!("t{task}-");
        let indices: Vec<usize> = written
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(indices, (0..PER_TASK).collect::<Vec<_>>());
    }
}

// =============================================================================
// Inbound path
// =============================================================================

#[tokio::test]
async fn test_inbound_binary_frames_delivered_in_order() {
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    transport.push_binary(vec![0u8; 10]);
    transport.push_binary(vec![0u8; 20]);
    transport.push_binary(vec![0u8; 30]);

    wait_until("delivery", || {
        scheduler.tick();
        recorder.events().len() == 3
    })
    .await;
    assert_eq!(
        recorder.events(),
        vec!["binary:10", "binary:20", "binary:30"]
    );

    // each frame was delivered exactly once; further ticks change nothing
    scheduler.tick_many(5);
    assert_eq!(recorder.events().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handlers_run_on_the_ticking_thread() {
    let (connector, transport, scheduler) = mock_connector();

    let seen_thread = Arc::new(Mutex::new(None));
    let capture = seen_thread.clone();
    connector.on_message(move |_| {
        *capture.lock() = Some(std::thread::current().id());
    });

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;
    transport.push_text("event");

    let ticking_thread = std::thread::current().id();
    wait_until("delivery", || {
        scheduler.tick();
        seen_thread.lock().is_some()
    })
    .await;
    assert_eq!(seen_thread.lock().unwrap(), ticking_thread);
}

#[tokio::test]
async fn test_unsubscribed_handler_stops_receiving() {
    let (connector, transport, scheduler) = mock_connector();

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let count = first.clone();
    let sub = connector.on_message(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });
    let count = second.clone();
    connector.on_message(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    assert!(connector.unsubscribe(sub));
    assert!(!connector.unsubscribe(sub));

    transport.push_text("event");
    wait_until("delivery", || {
        scheduler.tick();
        second.load(Ordering::SeqCst) == 1
    })
    .await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_messages_received_before_close_are_delivered_first() {
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    transport.push_text("a");
    transport.push_text("b");
    transport.close_stream(true);

    wait_until("closed", || connector.state() == ConnectionState::Closed).await;
    wait_until("close delivered", || {
        scheduler.tick();
        recorder.close_count() == 1
    })
    .await;

    assert_eq!(
        recorder.events(),
        vec!["text:a", "text:b", "close:closed"]
    );
    assert!(scheduler.is_idle());
}

// =============================================================================
// Lifecycle and failure semantics
// =============================================================================

#[tokio::test]
async fn test_close_is_idempotent_and_closes_transport() {
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    connector.close();
    connector.close();
    connector.join().await;

    assert_eq!(connector.state(), ConnectionState::Closed);
    assert!(transport.sink_closed());

    wait_until("close delivered", || {
        scheduler.tick();
        recorder.close_count() == 1
    })
    .await;
    scheduler.tick_many(5);
    assert_eq!(recorder.close_count(), 1);
}

#[tokio::test]
async fn test_mid_stream_fault_disconnects_once() {
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    transport.fail_stream("connection reset");
    wait_until("disconnected", || {
        connector.state() == ConnectionState::Disconnected
    })
    .await;

    wait_until("close delivered", || {
        scheduler.tick();
        recorder.close_count() == 1
    })
    .await;
    assert_eq!(recorder.events().last().unwrap(), "close:disconnected");

    // a dead connector rejects further sends instead of reviving the task
    let result = connector.send(Message::text("again"));
    assert!(matches!(
        result,
        Err(ConnectorError::Terminated(ConnectionState::Disconnected))
    ));
    assert_eq!(transport.connect_calls(), 1);
}

#[tokio::test]
async fn test_write_fault_disconnects() {
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    transport.fail_next_write("broken pipe");
    connector.send(Message::text("doomed")).unwrap();

    wait_until("disconnected", || {
        connector.state() == ConnectionState::Disconnected
    })
    .await;
    wait_until("close delivered", || {
        scheduler.tick();
        recorder.close_count() == 1
    })
    .await;
}

#[tokio::test]
async fn test_handshake_failure_disconnects() {
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);
    transport.fail_handshake("401 unauthorized");

    connector.send(Message::text("start")).unwrap();
    wait_until("disconnected", || {
        connector.state() == ConnectionState::Disconnected
    })
    .await;

    wait_until("close delivered", || {
        scheduler.tick();
        recorder.close_count() == 1
    })
    .await;
    assert!(connector.send(Message::text("again")).is_err());
}

#[tokio::test]
async fn test_peer_unclean_close_is_a_fault() {
    let (connector, transport, _scheduler) = mock_connector();
    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    transport.close_stream(false);
    wait_until("disconnected", || {
        connector.state() == ConnectionState::Disconnected
    })
    .await;
}

#[tokio::test]
async fn test_peer_stream_end_is_a_clean_close() {
    let (connector, transport, _scheduler) = mock_connector();
    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    transport.end_stream();
    wait_until("closed", || connector.state() == ConnectionState::Closed).await;
}

#[test]
fn test_close_before_any_send_still_fires_on_close() {
    // no runtime: nothing may spawn on this path
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);

    connector.close();
    assert_eq!(transport.connect_calls(), 0);
    assert_eq!(scheduler.pending(), 1);

    scheduler.tick();
    assert_eq!(recorder.close_count(), 1);
    assert_eq!(recorder.events(), vec!["close:closed"]);
    assert!(scheduler.is_idle());

    scheduler.tick_many(3);
    assert_eq!(recorder.close_count(), 1);

    assert!(matches!(
        connector.send(Message::text("late")),
        Err(ConnectorError::Terminated(ConnectionState::Closed))
    ));
}

#[tokio::test]
async fn test_close_during_handshake_never_connects() {
    let (connector, transport, scheduler) = mock_connector();
    let recorder = Arc::new(Recorder::default());
    recorder.attach(&connector);
    transport.hold_handshake();

    connector.send(Message::text("start")).unwrap();
    assert_eq!(connector.state(), ConnectionState::Connecting);

    connector.close();
    assert_eq!(connector.state(), ConnectionState::Closed);

    transport.release_handshake();
    connector.join().await;

    assert_eq!(connector.state(), ConnectionState::Closed);
    assert!(transport.sink_closed());
    // nothing was ever written to the wire
    assert!(transport.written().is_empty());

    wait_until("close delivered", || {
        scheduler.tick();
        recorder.close_count() == 1
    })
    .await;
}

#[tokio::test]
async fn test_shutdown_joins_the_io_task() {
    let (connector, transport, _scheduler) = mock_connector();
    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    connector.shutdown().await;
    assert_eq!(connector.state(), ConnectionState::Closed);
    assert!(transport.sink_closed());

    // join after completion returns immediately
    connector.join().await;
}

// =============================================================================
// Keep-alive
// =============================================================================

#[tokio::test]
async fn test_keepalive_pings_when_idle() {
    let config = ConnectorConfig::new("wss://mock.invalid/stream")
        .with_keepalive(Duration::from_millis(20));
    let (connector, transport, _scheduler) = mock_connector_with(config);

    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    wait_until("ping", || {
        transport
            .written()
            .iter()
            .any(|frame| matches!(frame, Frame::Ping(_)))
    })
    .await;
}

#[tokio::test]
async fn test_no_keepalive_by_default() {
    let (connector, transport, _scheduler) = mock_connector();
    connector.send(Message::text("start")).unwrap();
    wait_until("connected", || connector.is_connected()).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !transport
            .written()
            .iter()
            .any(|frame| matches!(frame, Frame::Ping(_)))
    );
}
