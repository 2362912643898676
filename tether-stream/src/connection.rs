//! Persistent stream connection.
//!
//! A single driver task owns the network session. It connects, flushes the
//! outbound queue, pumps frames, sends pings, checks liveness and reconnects
//! with exponential backoff until the connection is disposed.
//!
//! Ordering of outbound messages is kept by routing everything through one
//! lock: `send` either pushes into the live session channel or appends to the
//! queue, and the driver drains the queue into a fresh channel under the same
//! lock before publishing the `Open` state.

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::event::{EventKind, EventRegistry, StreamEvent, Subscription};
use crate::message::Message;
use crate::queue::OutboundQueue;
use crate::state::{ConnectionState, StreamStats};
use crate::transport::{Connector, FrameSink, FrameStream, TungsteniteConnector};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Persistent duplex connection with automatic reconnection.
///
/// `send` never blocks: while the connection is not open messages are queued
/// and written in submission order as soon as it opens. Failures are reported
/// through events, never to senders.
pub struct StreamConnection {
    inner: Arc<Inner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: StreamConfig,
    url: Url,
    connector: Arc<dyn Connector>,
    shared: Mutex<Shared>,
    events: EventRegistry,
    cancel: CancellationToken,
    connection_attempts: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

struct Shared {
    state: ConnectionState,
    queue: OutboundQueue,
    writer: Option<mpsc::UnboundedSender<Message>>,
    reconnect_attempts: u32,
    opened_at: Option<Instant>,
    last_ping_sent_at: Option<Instant>,
    last_pong_received_at: Option<Instant>,
    latency: Option<Duration>,
    disposed: bool,
}

enum SessionEnd {
    Disposed,
    Closed(String),
    Failed(StreamError),
}

impl StreamConnection {
    /// Create a WebSocket connection. Nothing is dialled until
    /// [`start`](Self::start).
    pub fn new(config: StreamConfig) -> StreamResult<Self> {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Create a connection that opens sessions through `connector`.
    pub fn with_connector(config: StreamConfig, connector: Arc<dyn Connector>) -> StreamResult<Self> {
        let url = config.validate()?;
        let queue = OutboundQueue::new(config.max_queue_size, config.overflow_policy);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                url,
                connector,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Closed,
                    queue,
                    writer: None,
                    reconnect_attempts: 0,
                    opened_at: None,
                    last_ping_sent_at: None,
                    last_pong_received_at: None,
                    latency: None,
                    disposed: false,
                }),
                events: EventRegistry::new(),
                cancel: CancellationToken::new(),
                connection_attempts: AtomicU64::new(0),
                messages_sent: AtomicU64::new(0),
                messages_received: AtomicU64::new(0),
            }),
            driver: Mutex::new(None),
        })
    }

    /// Create a WebSocket connection and start dialling immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub fn connect(config: StreamConfig) -> StreamResult<Self> {
        let connection = Self::new(config)?;
        connection.start()?;
        Ok(connection)
    }

    /// Spawn the driver task. Calling it again is a no-op.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) -> StreamResult<()> {
        let mut driver = self.driver.lock();
        if self.inner.shared.lock().disposed {
            return Err(StreamError::Disposed);
        }
        if driver.is_none() {
            debug!(url = %self.inner.url, "Starting stream driver");
            *driver = Some(tokio::spawn(run(self.inner.clone())));
        }
        Ok(())
    }

    /// Send a message, or queue it until the connection opens.
    pub fn send(&self, message: Message) -> StreamResult<()> {
        let dropped = {
            let mut shared = self.inner.shared.lock();
            if shared.disposed {
                return Err(StreamError::Disposed);
            }

            let message = match (&shared.writer, shared.state) {
                (Some(writer), ConnectionState::Open) => match writer.send(message) {
                    Ok(()) => return Ok(()),
                    Err(mpsc::error::SendError(message)) => message,
                },
                _ => message,
            };

            let dropped = shared.queue.push(message);
            trace!(queue_depth = shared.queue.len(), "Queued message until open");
            dropped
        };

        if let Some(dropped) = dropped {
            self.inner.overflow(dropped);
        }
        Ok(())
    }

    /// Send a text message.
    pub fn send_text<S: Into<String>>(&self, text: S) -> StreamResult<()> {
        self.send(Message::text(text))
    }

    /// Send a binary message. Queued the same way as text.
    pub fn send_binary<B: Into<Bytes>>(&self, data: B) -> StreamResult<()> {
        self.send(Message::binary(data))
    }

    /// Send a JSON message.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> StreamResult<()> {
        self.send(Message::json(value)?)
    }

    /// Register an event handler.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Remove an event handler.
    pub fn off(&self, subscription: &Subscription) -> bool {
        self.inner.events.off(subscription)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Check if the connection has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.shared.lock().disposed
    }

    /// Endpoint URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Connection configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Snapshot of state, queue depth and counters.
    pub fn stats(&self) -> StreamStats {
        let now = Instant::now();
        let shared = self.inner.shared.lock();
        StreamStats {
            state: shared.state,
            queue_depth: shared.queue.len(),
            reconnect_attempts: shared.reconnect_attempts,
            connection_attempts: self.inner.connection_attempts.load(Ordering::Relaxed),
            messages_sent: self.inner.messages_sent.load(Ordering::Relaxed),
            messages_received: self.inner.messages_received.load(Ordering::Relaxed),
            since_last_ping: shared
                .last_ping_sent_at
                .map(|at| now.saturating_duration_since(at)),
            since_last_pong: shared
                .last_pong_received_at
                .map(|at| now.saturating_duration_since(at)),
            latency: shared.latency,
        }
    }

    /// Stop the connection for good: cancel every timer, close the session if
    /// open and drop queued messages.
    pub async fn dispose(&self) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.disposed {
                return;
            }
            shared.disposed = true;
            if shared.state == ConnectionState::Open {
                shared.state = ConnectionState::Closing;
            }
        }

        info!(url = %self.inner.url, "Disposing stream connection");
        self.inner.cancel.cancel();

        let handle = self.driver.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Stream driver task ended abnormally");
        }

        let mut shared = self.inner.shared.lock();
        shared.queue.clear();
        shared.writer = None;
        shared.state = ConnectionState::Closed;
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        let mut shared = self.shared.lock();
        if !shared.disposed {
            shared.state = state;
        }
    }

    fn overflow(&self, dropped: Message) {
        let policy = self.config.overflow_policy;
        warn!(policy = ?policy, len = dropped.len(), "Outbound queue full, dropping message");
        self.events.emit(&StreamEvent::Overflow { dropped, policy });
    }

    /// Publish a new session: move queued messages into its channel, then mark
    /// the connection open, all under the shared lock.
    fn open_session(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let flushed = {
            let mut shared = self.shared.lock();
            let mut flushed = 0usize;
            for message in shared.queue.drain() {
                // rx is alive, so this cannot fail
                let _ = tx.send(message);
                flushed += 1;
            }
            shared.state = ConnectionState::Open;
            shared.writer = Some(tx);
            shared.reconnect_attempts = 0;
            shared.opened_at = Some(Instant::now());
            shared.last_ping_sent_at = None;
            shared.last_pong_received_at = None;
            shared.latency = None;
            flushed
        };

        info!(url = %self.url, flushed, "Stream connection open");
        self.events.emit(&StreamEvent::Open);
        rx
    }

    /// Detach the session and put everything it did not write back at the
    /// head of the queue.
    fn end_session(&self, rx: &mut mpsc::UnboundedReceiver<Message>, unsent: Option<Message>) {
        let dropped = {
            let mut shared = self.shared.lock();
            shared.writer = None;
            if !shared.disposed {
                shared.state = ConnectionState::Closed;
            }

            let mut pending: Vec<Message> = unsent.into_iter().collect();
            while let Ok(message) = rx.try_recv() {
                pending.push(message);
            }
            if !pending.is_empty() {
                debug!(count = pending.len(), "Requeued unsent messages");
            }
            shared.queue.requeue_front(pending)
        };

        for message in dropped {
            self.overflow(message);
        }
    }

    fn record_ping(&self) {
        self.shared.lock().last_ping_sent_at = Some(Instant::now());
    }

    fn record_pong(&self) {
        let now = Instant::now();
        let mut shared = self.shared.lock();
        shared.last_pong_received_at = Some(now);
        if let Some(sent) = shared.last_ping_sent_at {
            shared.latency = Some(now.saturating_duration_since(sent));
        }
    }

    /// Apply one inbound item. Returns how the session ends, if it does.
    fn handle_inbound(&self, inbound: Option<StreamResult<Message>>) -> Option<SessionEnd> {
        match inbound {
            Some(Ok(Message::Pong(_))) => self.record_pong(),
            Some(Ok(Message::Ping(_))) => trace!("Ping received"),
            Some(Ok(Message::Close)) => return Some(SessionEnd::Closed("closed by peer".into())),
            Some(Ok(message)) => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                self.events.emit(&StreamEvent::Message(message));
            }
            Some(Err(error)) => return Some(SessionEnd::Failed(error)),
            None => return Some(SessionEnd::Closed("stream ended".into())),
        }
        None
    }

    fn check_health(&self) -> Option<SessionEnd> {
        if !self.is_stale(Instant::now()) {
            return None;
        }
        warn!(stale_after = ?self.config.stale_after, "No pong in time, forcing reconnect");
        Some(SessionEnd::Failed(StreamError::Timeout(self.config.stale_after)))
    }

    /// No pong (or, before the first pong, no open) within `stale_after`.
    fn is_stale(&self, now: Instant) -> bool {
        let shared = self.shared.lock();
        shared
            .last_pong_received_at
            .or(shared.opened_at)
            .is_some_and(|at| now.saturating_duration_since(at) > self.config.stale_after)
    }
}

async fn run(inner: Arc<Inner>) {
    loop {
        if inner.cancel.is_cancelled() {
            break;
        }

        inner.set_state(ConnectionState::Connecting);
        let attempt = inner.connection_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(url = %inner.url, attempt, "Connecting");

        let connect_timeout = inner.config.connect_timeout;
        let connected = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            result = tokio::time::timeout(connect_timeout, inner.connector.connect(&inner.url)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(StreamError::Timeout(connect_timeout)),
                }
            }
        };

        match connected {
            Ok((sink, stream)) => {
                let mut rx = inner.open_session();
                let (end, unsent) = session(&inner, sink, stream, &mut rx).await;
                inner.end_session(&mut rx, unsent);

                match end {
                    SessionEnd::Disposed => break,
                    SessionEnd::Closed(reason) => {
                        info!(reason = %reason, "Stream connection closed");
                        inner.events.emit(&StreamEvent::Close { reason });
                    }
                    SessionEnd::Failed(error) => {
                        warn!(error = %error, "Stream session failed");
                        inner.events.emit(&StreamEvent::Error(error.clone()));
                        inner.events.emit(&StreamEvent::Close {
                            reason: error.to_string(),
                        });
                    }
                }
            }
            Err(error) => {
                warn!(url = %inner.url, attempt, error = %error, "Connection attempt failed");
                inner.set_state(ConnectionState::Closed);
                inner.events.emit(&StreamEvent::Error(error));
            }
        }

        if inner.cancel.is_cancelled() || !inner.config.auto_reconnect {
            break;
        }

        let attempts = inner.shared.lock().reconnect_attempts;
        if let Some(max) = inner.config.max_reconnect_attempts
            && attempts >= max
        {
            warn!(attempts, "Reconnect attempts exhausted, giving up");
            inner
                .events
                .emit(&StreamEvent::ReconnectExhausted { attempts });
            break;
        }

        let delay = inner.config.reconnect_delay(attempts);
        let attempt = {
            let mut shared = inner.shared.lock();
            shared.reconnect_attempts += 1;
            shared.reconnect_attempts
        };
        info!(attempt, delay = ?delay, "Scheduling reconnect");
        inner
            .events
            .emit(&StreamEvent::Reconnecting { attempt, delay });

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    inner.set_state(ConnectionState::Closed);
    debug!(url = %inner.url, "Stream driver stopped");
}

/// Pump one session until it ends. Returns why it ended and the data frame
/// that was being written when it ended, if any.
async fn session(
    inner: &Inner,
    mut sink: FrameSink,
    mut stream: FrameStream,
    rx: &mut mpsc::UnboundedReceiver<Message>,
) -> (SessionEnd, Option<Message>) {
    let config = &inner.config;
    let start = Instant::now();
    let mut ping = tokio::time::interval_at(start + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut health =
        tokio::time::interval_at(start + config.health_interval, config.health_interval);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let (end, unsent) = loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break (SessionEnd::Disposed, None),
            outbound = rx.recv() => {
                let Some(message) = outbound else {
                    break (SessionEnd::Closed("writer detached".into()), None);
                };
                let len = message.len();
                if let Err(end) =
                    write_frame(inner, &mut sink, &mut stream, &mut health, message.clone()).await
                {
                    break (end, Some(message));
                }
                inner.messages_sent.fetch_add(1, Ordering::Relaxed);
                trace!(len, "Frame written");
            }
            inbound = stream.next() => {
                if let Some(end) = inner.handle_inbound(inbound) {
                    break (end, None);
                }
            }
            _ = ping.tick() => {
                let frame = Message::Ping(Bytes::new());
                if let Err(end) = write_frame(inner, &mut sink, &mut stream, &mut health, frame).await {
                    break (end, None);
                }
                inner.record_ping();
            }
            _ = health.tick() => {
                if let Some(end) = inner.check_health() {
                    break (end, None);
                }
            }
        }
    };

    let send_close_frame = matches!(end, SessionEnd::Disposed);
    close_sink(&mut sink, send_close_frame, config.connect_timeout).await;
    (end, unsent)
}

/// Write one frame without losing sight of cancellation, inbound traffic and
/// the liveness check. The write is abandoned once `write_timeout` passes.
async fn write_frame(
    inner: &Inner,
    sink: &mut FrameSink,
    stream: &mut FrameStream,
    health: &mut Interval,
    message: Message,
) -> Result<(), SessionEnd> {
    let limit = inner.config.write_timeout;
    let write = tokio::time::timeout(limit, sink.send(message));
    tokio::pin!(write);

    loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return Err(SessionEnd::Disposed),
            written = &mut write => {
                return match written {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => Err(SessionEnd::Failed(error)),
                    Err(_) => {
                        warn!(timeout = ?limit, "Frame write timed out");
                        Err(SessionEnd::Failed(StreamError::Timeout(limit)))
                    }
                };
            }
            inbound = stream.next() => {
                if let Some(end) = inner.handle_inbound(inbound) {
                    return Err(end);
                }
            }
            _ = health.tick() => {
                if let Some(end) = inner.check_health() {
                    return Err(end);
                }
            }
        }
    }
}

/// Close the write half, sending a Close frame first if asked. Bounded by
/// `limit` since the peer may have stopped reading.
async fn close_sink(sink: &mut FrameSink, send_close_frame: bool, limit: Duration) {
    let closing = async {
        if send_close_frame
            && let Err(error) = sink.send(Message::Close).await
        {
            debug!(error = %error, "Close frame not sent");
        }
        if let Err(error) = sink.close().await {
            debug!(error = %error, "Closing stream sink failed");
        }
    };
    if tokio::time::timeout(limit, closing).await.is_err() {
        debug!(timeout = ?limit, "Close handshake timed out");
    }
}
