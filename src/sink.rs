//! Interfaces to the host media pipeline.
//!
//! The engine never talks to a pipeline framework directly. It consumes a
//! wall-clock source and pushes timestamped buffers through the `AudioSink`
//! trait; the host adapter maps these onto its own pads, caps and events.

use crate::audio::AudioFormat;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Outcome of pushing a buffer downstream.
///
/// Mirrors the flow results the pacer reacts to: anything other than `Ok`
/// eventually stops output scheduling, except a `Flushing` that coincides
/// with an in-progress barge-in flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlow {
    /// Buffer accepted.
    Ok,
    /// Downstream is flushing; transient during barge-in, otherwise terminal.
    Flushing,
    /// Downstream reached end of stream.
    Eos,
    /// Unrecoverable downstream error.
    Error,
}

/// A timestamped audio buffer handed downstream.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    /// Raw audio payload.
    pub data: bytes::Bytes,
    /// Presentation timestamp: clock base plus the running stream offset.
    pub pts: Duration,
    /// Buffer duration, always one frame interval.
    pub duration: Duration,
}

/// Downstream consumer of the paced output stream.
///
/// `push` must be implemented; the announce hooks default to no-ops so test
/// doubles and minimal hosts only implement what they observe.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Deliver one timestamped buffer downstream.
    async fn push(&self, buffer: OutputBuffer) -> SinkFlow;

    /// Announce the negotiated format before the first buffer of an
    /// activation.
    async fn announce_format(&self, _format: &AudioFormat) {}

    /// Announce a playback segment boundary. Called once per activation and
    /// again after every barge-in flush.
    async fn announce_segment(&self) {}

    /// Announce end of stream. Called at most once per activation.
    async fn announce_eos(&self) {}
}

/// Monotonic wall-clock source owned by the host pipeline.
///
/// Returns `None` until the pipeline is in a playing state; the pacer polls
/// for availability before capturing its timestamp base.
pub trait PipelineClock: Send + Sync {
    /// Current pipeline time, if the clock is running.
    fn now(&self) -> Option<Duration>;
}

/// Simple clock anchored at creation time, gated by an explicit running flag.
///
/// Uses `tokio::time::Instant` so tests driven with paused tokio time observe
/// the virtual clock.
pub struct SystemClock {
    origin: tokio::time::Instant,
    running: AtomicBool,
}

impl SystemClock {
    /// Create a stopped clock anchored at the current instant.
    pub fn new() -> Self {
        Self { origin: tokio::time::Instant::now(), running: AtomicBool::new(false) }
    }

    /// Start or stop the clock.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineClock for SystemClock {
    fn now(&self) -> Option<Duration> {
        self.running.load(Ordering::Acquire).then(|| self.origin.elapsed())
    }
}
