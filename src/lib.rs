//! Bidirectional WebSocket audio relay for real-time voice agents.
//!
//! This crate bridges a media pipeline and a WebSocket voice-bot backend.
//! Caller audio handed to [`RelayEngine::send`] goes to the peer as binary
//! frames; audio the peer sends back is buffered and re-emitted to an
//! [`AudioSink`] at a fixed frame cadence, with timestamps synthesized
//! across network gaps so the output stream never stalls or jumps. A JSON
//! `{"type": "clear"}` text frame from the peer flushes buffered audio for
//! barge-in, and a lost connection is redialed with exponential backoff.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ws_audio_relay::{RelayConfig, RelayEngine, SystemClock};
//! # use ws_audio_relay::{AudioSink, OutputBuffer, SinkFlow};
//! # struct NullSink;
//! # #[async_trait::async_trait]
//! # impl AudioSink for NullSink {
//! #     async fn push(&self, _buffer: OutputBuffer) -> SinkFlow { SinkFlow::Ok }
//! # }
//!
//! # async fn run() -> ws_audio_relay::Result<()> {
//! let config = RelayConfig::builder("ws://localhost:8765")
//!     .sample_rate(16_000)
//!     .frame_duration_ms(250)
//!     .build()?;
//!
//! let clock = Arc::new(SystemClock::default());
//! clock.set_running(true);
//! let engine = RelayEngine::new(config, Arc::new(NullSink), clock.clone());
//!
//! engine.prepare().await?;
//! engine.activate();
//! engine.send(&[0u8; 8000]).await?;
//! engine.release().await;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod connection;
pub mod control;
pub mod engine;
pub mod error;
pub mod queue;
pub mod sink;

mod pacer;

pub use audio::{AudioChunk, AudioFormat};
pub use config::{RelayConfig, RelayConfigBuilder};
pub use connection::ConnectionState;
pub use control::ControlMessage;
pub use engine::RelayEngine;
pub use error::{RelayError, Result};
pub use queue::ReceiveQueue;
pub use sink::{AudioSink, OutputBuffer, PipelineClock, SinkFlow, SystemClock};
