//! Frame-paced output scheduling.
//!
//! The pacer turns bursty network input into a gap-free, timestamped stream:
//! it waits for the pipeline clock, optionally accumulates an initial buffer,
//! then emits exactly one chunk per frame interval. When the queue runs dry
//! it synthesizes a timestamp-only gap so downstream timestamps never jump,
//! and once the connection is gone it drains the queue before announcing end
//! of stream.

use crate::audio::AudioFormat;
use crate::connection::{ConnectionState, Link, Shutdown};
use crate::queue::ReceiveQueue;
use crate::sink::{AudioSink, OutputBuffer, PipelineClock, SinkFlow};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Poll interval while waiting for the clock or negotiated format.
const WAIT_CLOCK_POLL: Duration = Duration::from_millis(10);
/// Poll interval while accumulating the initial buffer.
const INITIAL_BUFFER_POLL: Duration = Duration::from_millis(50);
/// Upper bound on any single timed wait, so stop requests are never missed
/// for longer than this.
const MAX_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Timestamp state for the output stream.
///
/// The pacer is the sole mutator except for the barge-in path, which resets
/// the running offset under the same lock.
#[derive(Debug, Default)]
struct TimingState {
    base: Duration,
    offset: Duration,
    initialized: bool,
    /// A fresh segment boundary must be announced before the next emission.
    resegment: bool,
    /// A barge-in flush is in progress; a `Flushing` push result is
    /// transient rather than terminal while this is set.
    flush_window: bool,
}

/// Shared handle around [`TimingState`].
#[derive(Debug, Default)]
pub(crate) struct Timing {
    inner: Mutex<TimingState>,
}

impl Timing {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reset everything for a new output activation.
    pub(crate) fn reset(&self) {
        *self.inner.lock() = TimingState::default();
    }

    /// Capture the wall-clock base for this activation.
    fn init_base(&self, base: Duration) {
        let mut timing = self.inner.lock();
        timing.base = base;
        timing.offset = Duration::ZERO;
        timing.initialized = true;
    }

    /// Assign the next timestamp and advance the offset by one frame.
    fn stamp(&self, frame: Duration) -> Duration {
        let mut timing = self.inner.lock();
        let pts = timing.base + timing.offset;
        timing.offset += frame;
        pts
    }

    /// Advance the offset without emitting data (silent gap).
    fn advance_gap(&self, frame: Duration) {
        self.inner.lock().offset += frame;
    }

    /// Barge-in: restart the stream offset at the base and request a fresh
    /// segment boundary. The captured base and initialized flag survive.
    pub(crate) fn barge_in(&self) {
        let mut timing = self.inner.lock();
        timing.offset = Duration::ZERO;
        timing.resegment = true;
        timing.flush_window = true;
    }

    /// Consume a pending segment-boundary request.
    fn take_resegment(&self) -> bool {
        let mut timing = self.inner.lock();
        std::mem::take(&mut timing.resegment)
    }

    /// Whether a barge-in flush window is currently open.
    fn in_flush_window(&self) -> bool {
        self.inner.lock().flush_window
    }

    /// Close the barge-in flush window after a successful delivery.
    fn close_flush_window(&self) {
        self.inner.lock().flush_window = false;
    }
}

/// The output pacer task. One instance per activation.
pub(crate) struct OutputPacer {
    pub(crate) queue: Arc<ReceiveQueue>,
    pub(crate) link: Arc<Link>,
    pub(crate) timing: Arc<Timing>,
    pub(crate) sink: Arc<dyn AudioSink>,
    pub(crate) clock: Arc<dyn PipelineClock>,
    pub(crate) format: Arc<Mutex<Option<AudioFormat>>>,
    pub(crate) initial_buffer_count: usize,
    pub(crate) shutdown: Arc<Shutdown>,
}

impl OutputPacer {
    /// Run the pacer until end of stream, a terminal downstream result, or a
    /// stop request.
    pub(crate) async fn run(self) {
        let activation = uuid::Uuid::new_v4();
        debug!(%activation, "Output pacer started");

        // WaitClock: poll for the pipeline clock and a negotiated format.
        let Some((format, base)) = self.wait_clock().await else {
            debug!(%activation, "Output pacer stopped before clock arrived");
            return;
        };
        let frame = format.frame_duration();
        self.timing.init_base(base);
        let mut next_deadline = base + frame;
        debug!(%activation, base_ms = base.as_millis() as u64, "Timing initialized");

        // InitialBuffering: absorb startup jitter before the first emission.
        if self.initial_buffer_count > 0 && !self.wait_initial_buffer().await {
            debug!(%activation, "Output pacer stopped during initial buffering");
            return;
        }

        self.sink.announce_format(&format).await;
        self.sink.announce_segment().await;

        // Streaming.
        loop {
            if self.shutdown.is_signalled() {
                break;
            }
            if self.link.eos_sent() {
                info!(%activation, "EOS already sent, stopping output pacer");
                break;
            }
            if !self.wait_until(next_deadline).await {
                break;
            }

            // A barge-in may have landed during the wait; the fresh segment
            // boundary must go downstream before the rewound audio does.
            if self.timing.take_resegment() {
                debug!(%activation, "Re-announcing segment after barge-in");
                self.sink.announce_segment().await;
            }

            match self.queue.pop_front() {
                Some(chunk) => {
                    let pts = self.timing.stamp(frame);
                    let buffer = OutputBuffer { data: chunk.data, pts, duration: frame };
                    let flow = self.sink.push(buffer).await;
                    // One push attempt per barge-in gets the tolerance;
                    // persistent flushing after that is a real stop.
                    let tolerate = self.timing.in_flush_window();
                    self.timing.close_flush_window();
                    match flow {
                        SinkFlow::Ok => {}
                        SinkFlow::Flushing if tolerate => {
                            trace!(%activation, "Push flushed during barge-in, continuing");
                        }
                        flow => {
                            warn!(%activation, ?flow, "Error pushing buffer, stopping output pacer");
                            break;
                        }
                    }
                    next_deadline += frame;
                }
                None => {
                    if self.link.mark_eos_if_disconnected() {
                        info!(%activation, "Queue drained and connection closed, sending EOS");
                        self.sink.announce_eos().await;
                        break;
                    }
                    // No data: advance timestamps anyway to keep the output
                    // stream continuous.
                    trace!(%activation, "No chunk available, synthesizing gap");
                    self.timing.advance_gap(frame);
                    next_deadline += frame;
                }
            }
        }

        debug!(%activation, "Output pacer stopped");
    }

    /// Wait for the clock and a usable format. Returns `None` on stop.
    async fn wait_clock(&self) -> Option<(AudioFormat, Duration)> {
        loop {
            if self.shutdown.is_signalled() {
                return None;
            }
            let format = *self.format.lock();
            if let (Some(format), Some(now)) = (format, self.clock.now()) {
                if format.frame_size_bytes() > 0 {
                    return Some((format, now));
                }
            }
            self.sleep_or_stop(WAIT_CLOCK_POLL).await;
        }
    }

    /// Block until the queue reaches the initial buffer threshold. Leaves
    /// early (returning true) if the connection drops, so a dead peer still
    /// drains and reaches EOS. Returns false on stop.
    async fn wait_initial_buffer(&self) -> bool {
        loop {
            if self.shutdown.is_signalled() {
                return false;
            }
            let len = self.queue.len();
            if len >= self.initial_buffer_count {
                info!(buffered = len, "Initial buffering complete, starting playback");
                return true;
            }
            if self.link.state() == ConnectionState::Disconnected {
                debug!(buffered = len, "Connection lost during initial buffering, draining");
                return true;
            }
            trace!(buffered = len, needed = self.initial_buffer_count, "Initial buffering");
            tokio::select! {
                _ = self.queue.wait_activity() => {}
                _ = tokio::time::sleep(INITIAL_BUFFER_POLL) => {}
                _ = self.shutdown.wait() => return false,
            }
        }
    }

    /// Wait until the pipeline clock reaches `deadline`. Returns false on
    /// stop. If the clock disappears mid-stream the wait simply idles in
    /// short slices until it returns.
    async fn wait_until(&self, deadline: Duration) -> bool {
        loop {
            if self.shutdown.is_signalled() {
                return false;
            }
            match self.clock.now() {
                Some(now) if now >= deadline => return true,
                Some(now) => {
                    let wait = (deadline - now).min(MAX_WAIT_SLICE);
                    self.sleep_or_stop(wait).await;
                }
                None => self.sleep_or_stop(WAIT_CLOCK_POLL).await,
            }
        }
    }

    async fn sleep_or_stop(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown.wait() => {}
        }
    }
}
