//! The relay engine facade.
//!
//! [`RelayEngine`] ties the connection task, receive queue, and output pacer
//! together behind a small lifecycle API modeled on a media element:
//! `prepare` dials the peer, `activate` starts paced output, `deactivate`
//! stops it, and `release` tears the whole thing down. The engine can be
//! prepared again after release.

use crate::audio::AudioFormat;
use crate::config::RelayConfig;
use crate::connection::{ConnectionManager, ConnectionState, Link, Shutdown};
use crate::error::{RelayError, Result};
use crate::pacer::{OutputPacer, Timing};
use crate::queue::ReceiveQueue;
use crate::sink::{AudioSink, PipelineClock};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Bidirectional WebSocket audio relay.
///
/// Inbound binary frames are queued and re-emitted to the [`AudioSink`] at a
/// fixed frame cadence; outbound audio handed to [`RelayEngine::send`] goes
/// to the peer as binary frames. Text frames carry control messages, of
/// which `clear` flushes buffered audio for barge-in.
pub struct RelayEngine {
    config: RelayConfig,
    sink: Arc<dyn AudioSink>,
    clock: Arc<dyn PipelineClock>,
    link: Arc<Link>,
    queue: Arc<ReceiveQueue>,
    timing: Arc<Timing>,
    format: Arc<Mutex<Option<AudioFormat>>>,
    connection: ConnectionManager,
    pacer: Mutex<Option<(Arc<Shutdown>, JoinHandle<()>)>>,
}

impl RelayEngine {
    /// Create an engine. Nothing runs until [`prepare`](Self::prepare).
    pub fn new(
        config: RelayConfig,
        sink: Arc<dyn AudioSink>,
        clock: Arc<dyn PipelineClock>,
    ) -> Self {
        let link = Arc::new(Link::new());
        let queue = Arc::new(ReceiveQueue::new(config.max_queue_size));
        let timing = Arc::new(Timing::new());
        let connection = ConnectionManager::new(
            config.clone(),
            Arc::clone(&link),
            Arc::clone(&queue),
            Arc::clone(&timing),
        );
        let format = Arc::new(Mutex::new(Some(config.format())));
        Self { config, sink, clock, link, queue, timing, format, connection, pacer: Mutex::new(None) }
    }

    /// Validate the configuration and start connecting. Waits up to the
    /// configured connect timeout for the socket to come up, but an
    /// unreachable peer is not fatal here: with reconnection enabled the
    /// background task keeps dialing.
    pub async fn prepare(&self) -> Result<()> {
        self.config.validate()?;
        info!(uri = %self.config.uri, "Preparing relay engine");
        self.connection.start()?;
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        if !timeout.is_zero() && !self.link.wait_connected(timeout).await {
            warn!(uri = %self.config.uri, "Connection not established yet, continuing");
        }
        Ok(())
    }

    /// Start the paced output task. No-op if already active.
    pub fn activate(&self) {
        let mut pacer = self.pacer.lock();
        if pacer.is_some() {
            return;
        }
        self.link.reset_eos();
        self.timing.reset();

        let shutdown = Arc::new(Shutdown::new());
        let task = OutputPacer {
            queue: Arc::clone(&self.queue),
            link: Arc::clone(&self.link),
            timing: Arc::clone(&self.timing),
            sink: Arc::clone(&self.sink),
            clock: Arc::clone(&self.clock),
            format: Arc::clone(&self.format),
            initial_buffer_count: self.config.initial_buffer_count,
            shutdown: Arc::clone(&shutdown),
        };
        let handle = tokio::spawn(task.run());
        *pacer = Some((shutdown, handle));
        debug!("Relay engine activated");
    }

    /// Stop the paced output task and reset stream timing. Buffered audio
    /// and the connection survive, so a later activation resumes cleanly.
    pub async fn deactivate(&self) {
        let taken = self.pacer.lock().take();
        if let Some((shutdown, handle)) = taken {
            shutdown.signal();
            if let Err(error) = handle.await {
                warn!(%error, "Output pacer ended abnormally");
            }
        }
        self.timing.reset();
        debug!("Relay engine deactivated");
    }

    /// Tear everything down: stop the connection, drop buffered audio, and
    /// return to the initial state.
    pub async fn release(&self) {
        self.deactivate().await;
        self.connection.stop().await;
        let flushed = self.queue.flush();
        if flushed > 0 {
            debug!(flushed, "Dropped buffered chunks on release");
        }
        self.link.reset();
        info!(uri = %self.config.uri, "Relay engine released");
    }

    /// Send one chunk of caller audio to the peer as a binary frame.
    ///
    /// While disconnected the chunk is silently dropped and `Ok` returned,
    /// so upstream producers keep flowing across reconnects. A transmit
    /// failure on a live socket is reported to the caller; it is not retried
    /// here, as the connection loop owns recovery.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        if !self.link.is_connected() {
            trace!(bytes = data.len(), "Not connected, dropping outbound audio");
            return Ok(());
        }
        match self.link.send_binary(data.to_vec()).await {
            Ok(()) => Ok(()),
            // The socket went away between the state check and the send;
            // same as the disconnected drop above.
            Err(RelayError::NotConnected) => {
                trace!(bytes = data.len(), "Connection lost, dropping outbound audio");
                Ok(())
            }
            Err(error) => {
                warn!(%error, "Failed to send outbound audio");
                Err(error)
            }
        }
    }

    /// Replace the negotiated audio format. Takes effect at the next
    /// activation.
    pub fn set_format(&self, format: AudioFormat) {
        *self.format.lock() = Some(format);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Whether the socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Number of chunks waiting to be emitted.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Total chunks discarded by queue overflow since creation.
    pub fn dropped_chunks(&self) -> u64 {
        self.queue.dropped()
    }

    /// (min, max) added latency: one frame of pacing up to a full queue.
    pub fn latency_bounds(&self) -> (Duration, Duration) {
        let format = (*self.format.lock()).unwrap_or_else(|| self.config.format());
        let frame = format.frame_duration();
        (frame, frame * self.config.max_queue_size as u32)
    }
}

impl std::fmt::Debug for RelayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayEngine")
            .field("uri", &self.config.uri)
            .field("state", &self.state())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}
