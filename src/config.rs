//! Configuration for the relay engine.

use crate::audio::AudioFormat;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default audio sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
/// Default channel count.
pub const DEFAULT_CHANNELS: u32 = 1;
/// Default frame duration in milliseconds.
pub const DEFAULT_FRAME_DURATION_MS: u32 = 250;
/// Default maximum receive queue size in chunks.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
/// Default number of chunks to accumulate before playback starts.
pub const DEFAULT_INITIAL_BUFFER_COUNT: usize = 3;
/// Default initial reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
/// Default maximum reconnect backoff in milliseconds.
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
/// Default bounded wait for the first connection in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;

/// Configuration for a relay engine.
///
/// Value loading (files, env, a host property system) is the caller's
/// concern; this is the plain value surface the engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// WebSocket URI to connect to (`ws://` or `wss://`). Required, no default.
    pub uri: String,

    /// Audio sample rate in Hz.
    pub sample_rate: u32,

    /// Number of audio channels.
    pub channels: u32,

    /// Frame duration in milliseconds (10..=1000).
    pub frame_duration_ms: u32,

    /// Maximum receive queue size in chunks (1..=1000). When full, the
    /// oldest chunk is dropped to make room for new data.
    pub max_queue_size: usize,

    /// Number of chunks to accumulate before playback starts (0 disables
    /// initial buffering).
    pub initial_buffer_count: usize,

    /// Whether to reconnect after a failed or closed connection.
    pub reconnect: bool,

    /// Initial delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Maximum reconnect backoff in milliseconds.
    pub reconnect_max_delay_ms: u64,

    /// Maximum reconnect attempts (0 = unlimited).
    pub max_reconnect_attempts: u32,

    /// How long `prepare` waits for the first connection before returning
    /// (milliseconds, 0 = do not wait). The connect loop keeps retrying in
    /// the background either way.
    pub connect_timeout_ms: u64,
}

impl RelayConfig {
    /// Create a configuration for the given URI with default values.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            initial_buffer_count: DEFAULT_INITIAL_BUFFER_COUNT,
            reconnect: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            reconnect_max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
            max_reconnect_attempts: 0,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }

    /// Create a builder for `RelayConfig`.
    pub fn builder(uri: impl Into<String>) -> RelayConfigBuilder {
        RelayConfigBuilder { config: Self::new(uri) }
    }

    /// Initial reconnect delay as a `Duration`.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Maximum reconnect backoff as a `Duration`.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    /// The audio format implied by this configuration.
    pub fn format(&self) -> AudioFormat {
        AudioFormat::pcm16(self.sample_rate, self.channels, self.frame_duration_ms)
    }

    /// Validate the configuration.
    ///
    /// A missing or malformed URI is fatal; everything else is range
    /// checked.
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(RelayError::config("No URI set"));
        }
        let parsed = url::Url::parse(&self.uri)
            .map_err(|e| RelayError::config(format!("Invalid URI '{}': {}", self.uri, e)))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(RelayError::config(format!(
                    "Unsupported URI scheme '{}' (expected ws or wss)",
                    other
                )));
            }
        }
        if !(10..=1000).contains(&self.frame_duration_ms) {
            return Err(RelayError::config(format!(
                "frame_duration_ms {} out of range (10..=1000)",
                self.frame_duration_ms
            )));
        }
        if !(1..=1000).contains(&self.max_queue_size) {
            return Err(RelayError::config(format!(
                "max_queue_size {} out of range (1..=1000)",
                self.max_queue_size
            )));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(RelayError::config(format!("channels {} out of range (1..=2)", self.channels)));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(RelayError::config("reconnect_delay_ms must be non-zero"));
        }
        Ok(())
    }
}

/// Builder for `RelayConfig`.
#[derive(Debug, Clone)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    /// Set the sample rate.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    /// Set the channel count.
    pub fn channels(mut self, channels: u32) -> Self {
        self.config.channels = channels;
        self
    }

    /// Set the frame duration in milliseconds.
    pub fn frame_duration_ms(mut self, ms: u32) -> Self {
        self.config.frame_duration_ms = ms;
        self
    }

    /// Set the maximum receive queue size in chunks.
    pub fn max_queue_size(mut self, chunks: usize) -> Self {
        self.config.max_queue_size = chunks;
        self
    }

    /// Set the initial buffer count (0 disables buffering).
    pub fn initial_buffer_count(mut self, chunks: usize) -> Self {
        self.config.initial_buffer_count = chunks;
        self
    }

    /// Enable or disable reconnection.
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    /// Set the initial reconnect delay in milliseconds.
    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    /// Set the maximum reconnect backoff in milliseconds.
    pub fn reconnect_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_max_delay_ms = ms;
        self
    }

    /// Set the maximum reconnect attempts (0 = unlimited).
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Set the bounded first-connect wait in milliseconds (0 = do not wait).
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Build the configuration, validating it.
    pub fn build(self) -> Result<RelayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
