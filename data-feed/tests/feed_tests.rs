use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Batch, ConnectFailure, ConnectionState, Error, Point};
use data_feed::{DataFeed, Diagnostic, FeedConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn batch_json(points: &[(f64, f64)]) -> String {
    let batch: Batch = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
    serde_json::to_string(&batch).unwrap()
}

/// Bind a loopback listener and build a feed pointed at it
async fn feed_with_listener(max_series_len: usize) -> (DataFeed, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = FeedConfig {
        max_series_len,
        connect_timeout: Some(WAIT),
        ..FeedConfig::for_address("127.0.0.1", port)
    };
    (DataFeed::new(config).unwrap(), listener)
}

/// Start the feed and return the producer side of the connection
async fn start_and_accept(feed: &DataFeed, listener: &TcpListener) -> TcpStream {
    let (started, accepted) = tokio::join!(feed.start(), listener.accept());
    started.unwrap();
    accepted.unwrap().0
}

/// Forward every delivered batch to a channel the test can await
fn batch_channel(feed: &DataFeed) -> mpsc::UnboundedReceiver<Vec<Point>> {
    let (tx, rx) = mpsc::unbounded_channel();
    feed.subscribe(move |points| tx.send(points.to_vec()).map_err(|e| e.to_string()));
    rx
}

async fn wait_for_state(feed: &DataFeed, expected: ConnectionState) {
    let mut states = feed.state_changes();
    timeout(WAIT, states.wait_for(|s| *s == expected))
        .await
        .expect("state change timed out")
        .unwrap();
}

async fn wait_for_diagnostic(
    diagnostics: &crossbeam_channel::Receiver<Diagnostic>,
    matches: impl Fn(&Diagnostic) -> bool,
) -> Diagnostic {
    timeout(WAIT, async {
        loop {
            while let Ok(diagnostic) = diagnostics.try_recv() {
                if matches(&diagnostic) {
                    return diagnostic;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("diagnostic not published")
}

#[tokio::test]
async fn test_stop_before_start_is_noop() {
    let (feed, _listener) = feed_with_listener(100).await;

    feed.stop().await;

    assert_eq!(feed.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_start_refused_leaves_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let feed = DataFeed::new(FeedConfig::for_address("127.0.0.1", port)).unwrap();
    let err = feed.start().await.unwrap_err();

    match err {
        Error::Connect { addr, reason } => {
            assert_eq!(addr, format!("127.0.0.1:{}", port));
            assert_eq!(reason, ConnectFailure::Refused);
        }
        other => panic!("expected connect error, got {:?}", other),
    }
    assert_eq!(feed.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_start_unresolvable_host() {
    let feed = DataFeed::new(FeedConfig {
        connect_timeout: Some(WAIT),
        ..FeedConfig::for_address("no-such-host.invalid", 65432)
    })
    .unwrap();

    let err = feed.start().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Connect { reason: ConnectFailure::Resolve(_), .. } | Error::Connect { reason: ConnectFailure::Timeout(_), .. }
    ));
    assert_eq!(feed.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_start_times_out_against_saturated_listener() {
    // A listener whose accept queue is full drops new SYNs, so the dial hangs
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut backlog = Vec::new();
    let mut saturated = false;
    for _ in 0..64 {
        match timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(stream) => backlog.push(stream.unwrap()),
            Err(_) => {
                saturated = true;
                break;
            }
        }
    }
    assert!(saturated, "accept queue never filled");

    let limit = Duration::from_millis(100);
    let feed = DataFeed::new(FeedConfig {
        connect_timeout: Some(limit),
        ..FeedConfig::for_address("127.0.0.1", addr.port())
    })
    .unwrap();

    let err = feed.start().await.unwrap_err();

    assert!(
        matches!(err, Error::Connect { reason: ConnectFailure::Timeout(d), .. } if d == limit),
        "expected connect timeout, got {:?}",
        err
    );
    assert_eq!(feed.state(), ConnectionState::Disconnected);
    drop(backlog);
}

#[tokio::test]
async fn test_receives_batches_split_and_coalesced() {
    let (feed, listener) = feed_with_listener(100).await;
    let mut batches = batch_channel(&feed);
    let mut producer = start_and_accept(&feed, &listener).await;
    assert_eq!(feed.state(), ConnectionState::Streaming);

    let first = batch_json(&[(1.0, 2.0), (3.5, -4.25)]);
    let second = batch_json(&[(0.5, 79.0)]);
    let third = batch_json(&[(4.0, -20.0), (2.0, 10.0)]);

    // First batch split mid-document, second and third coalesced into one write
    let (head, tail) = first.split_at(first.len() / 2);
    producer.write_all(head.as_bytes()).await.unwrap();
    producer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    producer.write_all(tail.as_bytes()).await.unwrap();
    producer.write_all(format!("{}{}", second, third).as_bytes()).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(timeout(WAIT, batches.recv()).await.unwrap().unwrap());
    }

    assert_eq!(received[0], vec![Point::new(1.0, 2.0), Point::new(3.5, -4.25)]);
    assert_eq!(received[1], vec![Point::new(0.5, 79.0)]);
    assert_eq!(received[2].len(), 2);
    assert_eq!(feed.snapshot().len(), 5);

    feed.stop().await;
}

#[tokio::test]
async fn test_framing_error_keeps_connection_open() {
    let (feed, listener) = feed_with_listener(100).await;
    let diagnostics = feed.diagnostics();
    let mut batches = batch_channel(&feed);
    let mut producer = start_and_accept(&feed, &listener).await;

    producer.write_all(b"[1,,2]").await.unwrap();
    producer.write_all(br#"{"not": "a batch"}"#).await.unwrap();
    producer.write_all(batch_json(&[(1.0, 1.0)]).as_bytes()).await.unwrap();

    let batch = timeout(WAIT, batches.recv()).await.unwrap().unwrap();
    assert_eq!(batch, vec![Point::new(1.0, 1.0)]);
    assert_eq!(feed.state(), ConnectionState::Streaming);

    wait_for_diagnostic(&diagnostics, |d| matches!(d, Diagnostic::Framing { .. })).await;
    wait_for_diagnostic(&diagnostics, |d| matches!(d, Diagnostic::Framing { .. })).await;

    feed.stop().await;
}

#[tokio::test]
async fn test_oversized_frame_reported_and_recovered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let feed = DataFeed::new(FeedConfig {
        max_frame_bytes: 128,
        ..FeedConfig::for_address("127.0.0.1", port)
    })
    .unwrap();
    let diagnostics = feed.diagnostics();
    let mut batches = batch_channel(&feed);
    let mut producer = start_and_accept(&feed, &listener).await;

    let mut runaway = b"[\"".to_vec();
    runaway.extend(std::iter::repeat(b'z').take(512));
    producer.write_all(&runaway).await.unwrap();

    let diagnostic = wait_for_diagnostic(&diagnostics, |d| matches!(d, Diagnostic::FrameTooLarge { .. })).await;
    assert!(matches!(diagnostic, Diagnostic::FrameTooLarge { limit: 128, .. }));

    producer.write_all(batch_json(&[(2.0, 3.0)]).as_bytes()).await.unwrap();
    let batch = timeout(WAIT, batches.recv()).await.unwrap().unwrap();
    assert_eq!(batch, vec![Point::new(2.0, 3.0)]);

    feed.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_closes_socket() {
    let (feed, listener) = feed_with_listener(100).await;
    let diagnostics = feed.diagnostics();
    let mut producer = start_and_accept(&feed, &listener).await;

    feed.stop().await;
    assert_eq!(feed.state(), ConnectionState::Disconnected);
    feed.stop().await;
    assert_eq!(feed.state(), ConnectionState::Disconnected);

    wait_for_diagnostic(&diagnostics, |d| *d == Diagnostic::Stopped).await;

    // The producer side observes the close
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, tokio::io::AsyncReadExt::read(&mut producer, &mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_start_while_streaming_is_rejected() {
    let (feed, listener) = feed_with_listener(100).await;
    let _producer = start_and_accept(&feed, &listener).await;

    assert!(matches!(feed.start().await, Err(Error::AlreadyStreaming)));
    assert_eq!(feed.state(), ConnectionState::Streaming);

    feed.stop().await;
}

#[tokio::test]
async fn test_peer_close_disconnects_without_reconnect() {
    let (feed, listener) = feed_with_listener(100).await;
    let diagnostics = feed.diagnostics();
    let mut producer = start_and_accept(&feed, &listener).await;

    producer.write_all(batch_json(&[(1.0, 2.0)]).as_bytes()).await.unwrap();
    drop(producer);

    wait_for_state(&feed, ConnectionState::Disconnected).await;
    wait_for_diagnostic(&diagnostics, |d| *d == Diagnostic::PeerClosed).await;
    assert_eq!(feed.snapshot(), vec![Point::new(1.0, 2.0)]);

    // Nothing dials back on its own
    let reconnect = timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(reconnect.is_err());

    // A fresh start() works after the peer went away
    let mut batches = batch_channel(&feed);
    let mut producer = start_and_accept(&feed, &listener).await;
    assert_eq!(feed.state(), ConnectionState::Streaming);
    producer.write_all(batch_json(&[(5.0, 6.0)]).as_bytes()).await.unwrap();
    let batch = timeout(WAIT, batches.recv()).await.unwrap().unwrap();
    assert_eq!(batch, vec![Point::new(5.0, 6.0)]);
    assert_eq!(feed.snapshot(), vec![Point::new(1.0, 2.0), Point::new(5.0, 6.0)]);

    feed.stop().await;
}

#[tokio::test]
async fn test_connection_reset_ends_loop_with_transport_diagnostic() {
    let (feed, listener) = feed_with_listener(100).await;
    let diagnostics = feed.diagnostics();
    let producer = start_and_accept(&feed, &listener).await;

    // Zero linger turns the close into a reset
    producer.set_linger(Some(Duration::ZERO)).unwrap();
    drop(producer);

    let diagnostic = wait_for_diagnostic(&diagnostics, |d| d.is_terminal()).await;
    assert!(
        matches!(diagnostic, Diagnostic::Transport { .. }),
        "expected transport error, got {:?}",
        diagnostic
    );
    wait_for_state(&feed, ConnectionState::Disconnected).await;

    // Stopping an already finished session only reaps it
    feed.stop().await;
    assert_eq!(feed.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_independent_feeds_coexist() {
    let (first, first_listener) = feed_with_listener(100).await;
    let (second, second_listener) = feed_with_listener(100).await;
    let mut first_producer = start_and_accept(&first, &first_listener).await;
    let _second_producer = start_and_accept(&second, &second_listener).await;

    let mut batches = batch_channel(&first);
    first_producer.write_all(batch_json(&[(1.0, 1.0)]).as_bytes()).await.unwrap();
    timeout(WAIT, batches.recv()).await.unwrap().unwrap();

    first.stop().await;
    assert_eq!(first.state(), ConnectionState::Disconnected);
    assert_eq!(second.state(), ConnectionState::Streaming);
    assert!(second.is_empty());

    second.stop().await;
}

#[test]
fn test_eviction_keeps_last_fifty_points() {
    let feed = DataFeed::new(FeedConfig {
        max_series_len: 50,
        ..FeedConfig::for_address("127.0.0.1", 65432)
    })
    .unwrap();

    for batch in 0..7 {
        let points: Batch = (0..10)
            .map(|i| Point::new((batch * 10 + i) as f64, 0.0))
            .collect();
        feed.ingest(points);
    }

    let snapshot = feed.snapshot();
    assert_eq!(snapshot.len(), 50);
    let xs: Vec<f64> = snapshot.iter().map(|p| p.x).collect();
    let expected: Vec<f64> = (20..70).map(|i| i as f64).collect();
    assert_eq!(xs, expected);
}

#[test]
fn test_subscribers_isolated_and_ordered() {
    let feed = DataFeed::new(FeedConfig::for_address("127.0.0.1", 65432)).unwrap();
    let diagnostics = feed.diagnostics();
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = order.clone();
    feed.subscribe(move |_points| {
        log.lock().unwrap().push("first");
        Ok::<(), String>(())
    });
    let failing = feed.subscribe(|_points| Err::<(), _>("plot closed"));
    let panicking = feed.subscribe(|_points| -> Result<(), String> { panic!("boom") });
    let log = order.clone();
    feed.subscribe(move |points| {
        log.lock().unwrap().push("last");
        assert_eq!(points.len(), 2);
        Ok::<(), String>(())
    });

    feed.ingest(Batch::new(vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)]));

    assert_eq!(*order.lock().unwrap(), vec!["first", "last"]);
    assert_eq!(
        diagnostics.try_recv().unwrap(),
        Diagnostic::SubscriberFailed {
            id: failing,
            reason: "plot closed".to_string()
        }
    );
    match diagnostics.try_recv().unwrap() {
        Diagnostic::SubscriberFailed { id, reason } => {
            assert_eq!(id, panicking);
            assert!(reason.contains("boom"));
        }
        other => panic!("unexpected diagnostic {:?}", other),
    }
    assert_eq!(feed.len(), 2);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let feed = DataFeed::new(FeedConfig::for_address("127.0.0.1", 65432)).unwrap();
    let calls = Arc::new(Mutex::new(0));

    let counter = calls.clone();
    let id = feed.subscribe(move |_points| {
        *counter.lock().unwrap() += 1;
        Ok::<(), String>(())
    });

    feed.ingest(Batch::new(vec![Point::new(0.0, 0.0)]));
    assert!(feed.unsubscribe(id));
    assert!(!feed.unsubscribe(id));
    feed.ingest(Batch::new(vec![Point::new(1.0, 1.0)]));

    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let config = FeedConfig {
        max_series_len: 0,
        ..FeedConfig::for_address("127.0.0.1", 65432)
    };
    assert!(matches!(DataFeed::new(config), Err(Error::ConfigurationError(_))));
}
