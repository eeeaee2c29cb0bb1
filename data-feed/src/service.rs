//! Data feed service implementation

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use common::{Batch, ConnectFailure, ConnectionState, Error, ExportDocument, ExportFormat, Point, Result};
use crossbeam_channel::Receiver;
use frame_decoder::FrameDecoder;
use tokio::io::AsyncReadExt;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::channel::DiagnosticsChannel;
use crate::config::FeedConfig;
use crate::export;
use crate::models::{Diagnostic, SubscriptionId};
use crate::series::Series;
use crate::subscription::SubscriberRegistry;

/// State shared between the feed handle and its receive loop
struct FeedShared {
    /// Accumulated points
    series: Series,
    /// Batch callbacks
    subscribers: SubscriberRegistry,
    /// Diagnostics fan-out
    diagnostics: DiagnosticsChannel,
    /// Connection state, observable through watch receivers
    state: watch::Sender<ConnectionState>,
}

impl FeedShared {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    /// Run received bytes through the decoder and ingest every batch
    fn ingest_bytes(&self, decoder: &mut FrameDecoder, bytes: &[u8]) {
        for result in decoder.feed(bytes) {
            match result.and_then(|frame| frame.decode::<Batch>()) {
                Ok(batch) => self.ingest(batch),
                Err(err) => self.diagnostics.publish(err.into()),
            }
        }
    }

    fn ingest(&self, batch: Batch) {
        if batch.is_empty() {
            debug!("Ignoring empty batch");
            return;
        }
        let evicted = self.series.append(batch.points());
        debug!(points = batch.len(), evicted, "Batch appended");
        self.subscribers.notify(batch.points(), &self.diagnostics);
    }
}

/// Active connection owned by the feed
struct Session {
    /// Flipped to `true` to make the receive loop return
    cancel: watch::Sender<bool>,
    /// Receive loop task
    handle: JoinHandle<()>,
}

/// Client-side live data feed
///
/// Owns one outbound stream connection, decodes the batches pushed over it
/// into a bounded [`Series`] and notifies subscribers of each batch. Every
/// feed carries its own state and cancellation signal, so independent feeds
/// can run side by side.
pub struct DataFeed {
    /// Feed configuration
    config: FeedConfig,
    /// State shared with the receive loop
    shared: Arc<FeedShared>,
    /// Current session; the lock serializes `start()` and `stop()`
    session: Mutex<Option<Session>>,
}

impl DataFeed {
    /// Create a new data feed
    pub fn new(config: FeedConfig) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            shared: Arc::new(FeedShared {
                series: Series::new(config.max_series_len),
                subscribers: SubscriberRegistry::new(),
                diagnostics: DiagnosticsChannel::new(),
                state,
            }),
            config,
            session: Mutex::new(None),
        })
    }

    /// Feed configuration
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Listener for framing, transport and subscriber diagnostics
    pub fn diagnostics(&self) -> Receiver<Diagnostic> {
        self.shared.diagnostics.subscribe()
    }

    /// Connect to the producer and start the receive loop
    ///
    /// Fails with [`Error::Connect`] when the address cannot be resolved or
    /// dialled, leaving the feed `Disconnected`, and with
    /// [`Error::AlreadyStreaming`] while a previous session is still running.
    pub async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;

        if let Some(previous) = session.take() {
            // Only the receive loop marks a live session Disconnected, right before it returns
            if !previous.handle.is_finished() && self.state().is_active() {
                *session = Some(previous);
                return Err(Error::AlreadyStreaming);
            }
            if let Err(err) = previous.handle.await {
                error!("Previous receive loop ended abnormally: {}", err);
            }
        }

        info!("Connecting to {}", self.config.address());
        self.shared.set_state(ConnectionState::Connecting);
        let stream = match connect(&self.config).await {
            Ok(stream) => stream,
            Err(err) => {
                error!("Connect failed: {}", err);
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(err);
            }
        };

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.config.address());
        let (cancel, cancelled) = watch::channel(false);
        let decoder = FrameDecoder::new(self.config.max_frame_bytes);

        self.shared.set_state(ConnectionState::Streaming);
        self.shared.diagnostics.publish(Diagnostic::Connected { peer });

        let handle = tokio::spawn(receive_loop(
            self.shared.clone(),
            stream,
            decoder,
            cancelled,
            self.config.read_buffer_size,
        ));
        *session = Some(Session { cancel, handle });

        Ok(())
    }

    /// Stop the receive loop and close the connection
    ///
    /// Does not wait on a pending read: cancellation makes the loop drop the
    /// socket at its next suspension point. Calling it when no session is
    /// active is a no-op.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        let Some(active) = session.take() else {
            debug!("stop() called without an active session");
            return;
        };

        if !active.handle.is_finished() {
            self.shared.set_state(ConnectionState::Closing);
            let _ = active.cancel.send(true);
        }
        if let Err(err) = active.handle.await {
            error!("Receive loop ended abnormally: {}", err);
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Register a callback invoked with each newly appended batch
    ///
    /// A callback that fails or panics is reported on the diagnostics channel
    /// and does not affect other callbacks or the receive loop.
    pub fn subscribe<F, E>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[Point]) -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Display,
    {
        self.shared.subscribers.subscribe(callback)
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.unsubscribe(id)
    }

    /// Append a decoded batch and notify subscribers, as the receive loop does
    pub fn ingest(&self, batch: Batch) {
        self.shared.ingest(batch);
    }

    /// Point-in-time copy of the series
    pub fn snapshot(&self) -> Vec<Point> {
        self.shared.series.snapshot()
    }

    /// Current series length
    pub fn len(&self) -> usize {
        self.shared.series.len()
    }

    /// Whether no points have been retained
    pub fn is_empty(&self) -> bool {
        self.shared.series.is_empty()
    }

    /// Drop all retained points
    pub fn clear(&self) {
        self.shared.series.clear();
    }

    /// Encode the current snapshot; has no side effects
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        export::encode(&ExportDocument::from(self.snapshot()), format)
    }

    /// Timestamped path under the configured export directory
    pub fn default_export_path(&self, format: ExportFormat) -> PathBuf {
        export::default_export_path(&self.config.export_dir, &self.config.export_prefix, format, &Local::now())
    }

    /// Export and atomically write to `path`, or to the default path
    pub fn save(&self, format: ExportFormat, path: Option<&Path>) -> Result<PathBuf> {
        let bytes = self.export(format)?;
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_export_path(format));
        export::write_export(&path, &bytes)?;
        Ok(path)
    }
}

/// Resolve and dial the configured producer, honouring the connect timeout
async fn connect(config: &FeedConfig) -> Result<TcpStream> {
    let addr = config.address();
    match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, dial(&addr))
            .await
            .map_err(|_| Error::Connect {
                addr: addr.clone(),
                reason: ConnectFailure::Timeout(limit),
            })?,
        None => dial(&addr).await,
    }
}

/// Try every resolved address in turn
async fn dial(addr: &str) -> Result<TcpStream> {
    let connect_error = |reason| Error::Connect {
        addr: addr.to_string(),
        reason,
    };

    let candidates: Vec<_> = lookup_host(addr)
        .await
        .map_err(|e| connect_error(ConnectFailure::Resolve(e.to_string())))?
        .collect();
    if candidates.is_empty() {
        return Err(connect_error(ConnectFailure::Resolve("no addresses found".to_string())));
    }

    let mut last_failure = ConnectFailure::Other("no address attempted".to_string());
    for candidate in candidates {
        match TcpStream::connect(candidate).await {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                last_failure = ConnectFailure::Refused;
            }
            Err(e) => last_failure = ConnectFailure::Other(e.to_string()),
        }
        debug!(%candidate, reason = %last_failure, "Connect attempt failed");
    }
    Err(connect_error(last_failure))
}

/// Read until the peer closes, a read fails, or cancellation is requested
async fn receive_loop(
    shared: Arc<FeedShared>,
    mut stream: TcpStream,
    mut decoder: FrameDecoder,
    mut cancelled: watch::Receiver<bool>,
    read_buffer_size: usize,
) {
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        tokio::select! {
            biased;

            // Also fires when the feed is dropped and the sender goes away
            _ = cancelled.changed() => {
                shared.diagnostics.publish(Diagnostic::Stopped);
                break;
            }
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    shared.diagnostics.publish(Diagnostic::PeerClosed);
                    shared.set_state(ConnectionState::Disconnected);
                    break;
                }
                Ok(n) => shared.ingest_bytes(&mut decoder, &buf[..n]),
                Err(e) => {
                    shared.diagnostics.publish(Diagnostic::Transport { reason: e.to_string() });
                    shared.set_state(ConnectionState::Disconnected);
                    break;
                }
            },
        }
    }

    if !decoder.is_empty() {
        debug!(bytes = decoder.buffered_len(), "Discarding incomplete frame");
    }
}
