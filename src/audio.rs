//! Audio format definitions and chunk types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Negotiated audio format, as delivered by the host pipeline.
///
/// The relay is codec agnostic: it never inspects samples, it only needs the
/// byte rate to size frames and derive per-frame durations. All fields come
/// from external caps negotiation and are treated as read-only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g. 16000, 24000, 8000).
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u32,
    /// Bytes per sample (2 for PCM16, 1 for G.711 mu-law/A-law).
    pub bytes_per_sample: u32,
    /// Frame duration in milliseconds.
    pub frame_duration_ms: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16(16_000, 1, 250)
    }
}

impl AudioFormat {
    /// Create a new audio format description.
    pub fn new(sample_rate: u32, channels: u32, bytes_per_sample: u32, frame_duration_ms: u32) -> Self {
        Self { sample_rate, channels, bytes_per_sample, frame_duration_ms }
    }

    /// 16-bit PCM at the given rate and channel count.
    pub fn pcm16(sample_rate: u32, channels: u32, frame_duration_ms: u32) -> Self {
        Self::new(sample_rate, channels, 2, frame_duration_ms)
    }

    /// G.711 (mu-law or A-law) telephony audio, one byte per sample.
    pub fn g711(sample_rate: u32, channels: u32, frame_duration_ms: u32) -> Self {
        Self::new(sample_rate, channels, 1, frame_duration_ms)
    }

    /// Bytes per second for this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.channels * self.bytes_per_sample
    }

    /// Size of one frame in bytes: rate * bytes/sample * channels * duration.
    pub fn frame_size_bytes(&self) -> usize {
        (self.sample_rate as usize
            * self.bytes_per_sample as usize
            * self.channels as usize
            * self.frame_duration_ms as usize)
            / 1000
    }

    /// Duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }
}

/// One received network message's payload, the unit stored in the receive
/// queue. Owned exclusively by whichever structure currently holds it.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw audio payload, forwarded verbatim from the wire.
    pub data: Bytes,
}

impl AudioChunk {
    /// Wrap a raw payload as a chunk.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
