//! WebSocket connection lifecycle.
//!
//! A single background task owns the connection: it dials the peer, splits
//! the socket, parks the write half for outbound sends, and reads inbound
//! frames until the peer goes away. If reconnection is enabled the task
//! redials with exponential backoff; otherwise a lost connection is final
//! and the pacer drains toward EOS.

use crate::audio::AudioChunk;
use crate::config::RelayConfig;
use crate::control::{apply_control, parse_control};
use crate::error::{RelayError, Result};
use crate::pacer::Timing;
use crate::queue::ReceiveQueue;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection state as observed by the rest of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, and no dial in flight.
    Disconnected,
    /// A dial attempt is in flight.
    Connecting,
    /// The socket is up and frames are flowing.
    Connected,
}

/// Cooperative stop signal shared between a task and its owner.
#[derive(Debug, Default)]
pub(crate) struct Shutdown {
    flag: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_signalled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_signalled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
struct LinkInner {
    state: ConnectionState,
    /// Whether this engine lifetime ever reached `Connected`. A relay that
    /// never connected must not emit EOS just because its queue is empty.
    has_connected: bool,
    eos_sent: bool,
}

/// Shared view of the connection, used by the pacer and the outbound path.
pub(crate) struct Link {
    inner: Mutex<LinkInner>,
    changed: Notify,
    outbound: tokio::sync::Mutex<Option<WsSink>>,
}

impl Link {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                state: ConnectionState::Disconnected,
                has_connected: false,
                eos_sent: false,
            }),
            changed: Notify::new(),
            outbound: tokio::sync::Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        {
            let mut inner = self.inner.lock();
            inner.state = state;
            if state == ConnectionState::Connected {
                inner.has_connected = true;
            }
        }
        self.changed.notify_waiters();
    }

    pub(crate) fn eos_sent(&self) -> bool {
        self.inner.lock().eos_sent
    }

    /// Atomically claim the right to announce EOS. Returns true exactly once
    /// per lifetime, and only after the connection has come and gone.
    pub(crate) fn mark_eos_if_disconnected(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Disconnected && inner.has_connected && !inner.eos_sent {
            inner.eos_sent = true;
            true
        } else {
            false
        }
    }

    /// Clear the EOS latch for a new output activation.
    pub(crate) fn reset_eos(&self) {
        self.inner.lock().eos_sent = false;
    }

    /// Full reset for engine release.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = ConnectionState::Disconnected;
        inner.has_connected = false;
        inner.eos_sent = false;
    }

    /// Wait up to `timeout` for the connection to come up. Returns whether
    /// it did.
    pub(crate) async fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            if self.is_connected() {
                return true;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return self.is_connected(),
            }
        }
    }

    /// Send one binary frame on the current socket.
    pub(crate) async fn send_binary(&self, data: Vec<u8>) -> Result<()> {
        let mut outbound = self.outbound.lock().await;
        let sink = outbound.as_mut().ok_or(RelayError::NotConnected)?;
        sink.send(Message::Binary(data))
            .await
            .map_err(|e| RelayError::connection(format!("Failed to send frame: {e}")))
    }

    async fn install_sink(&self, sink: WsSink) {
        *self.outbound.lock().await = Some(sink);
    }

    async fn take_sink(&self) -> Option<WsSink> {
        self.outbound.lock().await.take()
    }
}

/// Exponential backoff with a hard ceiling.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, current: initial }
    }

    /// The delay to wait before the next attempt, doubling for the one after.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Return to the initial delay after a successful connect.
    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Owns the background connection task.
pub(crate) struct ConnectionManager {
    config: RelayConfig,
    link: Arc<Link>,
    queue: Arc<ReceiveQueue>,
    timing: Arc<Timing>,
    task: Mutex<Option<(Arc<Shutdown>, JoinHandle<()>)>>,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: RelayConfig,
        link: Arc<Link>,
        queue: Arc<ReceiveQueue>,
        timing: Arc<Timing>,
    ) -> Self {
        Self { config, link, queue, timing, task: Mutex::new(None) }
    }

    /// Start the connection task. Returns immediately; callers that need the
    /// socket up use [`Link::wait_connected`].
    pub(crate) fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }
        self.config.validate()?;

        let shutdown = Arc::new(Shutdown::new());
        let worker = ConnectionWorker {
            config: self.config.clone(),
            link: Arc::clone(&self.link),
            queue: Arc::clone(&self.queue),
            timing: Arc::clone(&self.timing),
            shutdown: Arc::clone(&shutdown),
        };
        let handle = tokio::spawn(worker.run());
        *task = Some((shutdown, handle));
        Ok(())
    }

    /// Stop the connection task and close the socket. Idempotent.
    pub(crate) async fn stop(&self) {
        let taken = self.task.lock().take();
        if let Some((shutdown, handle)) = taken {
            shutdown.signal();
            if let Err(error) = handle.await {
                warn!(%error, "Connection task ended abnormally");
            }
        }
        if let Some(mut sink) = self.link.take_sink().await {
            let _ = sink.close().await;
        }
        self.link.set_state(ConnectionState::Disconnected);
    }
}

/// The state moved into the spawned connection task.
struct ConnectionWorker {
    config: RelayConfig,
    link: Arc<Link>,
    queue: Arc<ReceiveQueue>,
    timing: Arc<Timing>,
    shutdown: Arc<Shutdown>,
}

impl ConnectionWorker {
    async fn run(self) {
        let mut backoff =
            Backoff::new(self.config.reconnect_delay(), self.config.reconnect_max_delay());
        let mut attempts: u32 = 0;

        loop {
            if self.shutdown.is_signalled() {
                break;
            }

            match self.connect_once().await {
                Ok((sink, source)) => {
                    info!(uri = %self.config.uri, "WebSocket connected");
                    backoff.reset();
                    attempts = 0;
                    self.link.install_sink(sink).await;
                    self.link.set_state(ConnectionState::Connected);
                    self.read_loop(source).await;
                    if let Some(mut sink) = self.link.take_sink().await {
                        let _ = sink.close().await;
                    }
                    if !self.shutdown.is_signalled() {
                        info!(uri = %self.config.uri, "WebSocket disconnected");
                    }
                }
                Err(error) => {
                    warn!(uri = %self.config.uri, %error, "WebSocket connection failed");
                }
            }

            if self.shutdown.is_signalled() || !self.config.reconnect {
                break;
            }
            attempts += 1;
            if self.config.max_reconnect_attempts != 0
                && attempts >= self.config.max_reconnect_attempts
            {
                warn!(attempts, "Reconnect attempt limit reached, giving up");
                break;
            }

            // Stay in Connecting through the backoff so the dropped link is
            // not mistaken for a final disconnect while a redial is pending.
            self.link.set_state(ConnectionState::Connecting);
            let delay = backoff.next_delay();
            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.wait() => break,
            }
        }

        self.link.set_state(ConnectionState::Disconnected);
        debug!("Connection task stopped");
    }

    async fn connect_once(&self) -> Result<(WsSink, WsSource)> {
        self.link.set_state(ConnectionState::Connecting);
        debug!(uri = %self.config.uri, "Dialing WebSocket");
        let dial = connect_async(self.config.uri.as_str());
        let (stream, response) = tokio::select! {
            result = dial => {
                result.map_err(|e| RelayError::connection(format!("Connect failed: {e}")))?
            }
            _ = self.shutdown.wait() => {
                return Err(RelayError::connection("Shutdown during connect"));
            }
        };
        trace!(status = %response.status(), "WebSocket handshake complete");
        Ok(stream.split())
    }

    /// Read frames until the peer closes, the read errors, or we stop.
    async fn read_loop(&self, mut source: WsSource) {
        loop {
            let message = tokio::select! {
                message = source.next() => message,
                _ = self.shutdown.wait() => break,
            };
            match message {
                Some(Ok(Message::Binary(data))) => {
                    trace!(bytes = data.len(), "Received audio chunk");
                    self.queue.push(AudioChunk::new(data));
                }
                Some(Ok(Message::Text(text))) => {
                    if let Some(control) = parse_control(&text) {
                        apply_control(control, &self.queue, &self.timing);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Peer closed the connection");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong are handled by tungstenite itself.
                }
                Some(Err(error)) => {
                    warn!(%error, "WebSocket read error");
                    break;
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(5000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn backoff_returns_to_initial_after_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(8000));
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn link_eos_requires_prior_connection() {
        let link = Link::new();
        assert!(!link.mark_eos_if_disconnected());
        link.set_state(ConnectionState::Connected);
        assert!(!link.mark_eos_if_disconnected());
        link.set_state(ConnectionState::Disconnected);
        assert!(link.mark_eos_if_disconnected());
        // Latched until the next activation resets it.
        assert!(!link.mark_eos_if_disconnected());
        link.reset_eos();
        assert!(link.mark_eos_if_disconnected());
    }

    #[tokio::test]
    async fn shutdown_wakes_waiters() {
        let shutdown = Arc::new(Shutdown::new());
        let waiter = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { shutdown.wait().await })
        };
        shutdown.signal();
        waiter.await.unwrap();
        assert!(shutdown.is_signalled());
    }
}
