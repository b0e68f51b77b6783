//! Control-plane message interpretation.
//!
//! The relay peer sends audio as binary WebSocket frames and control
//! messages as JSON text frames. The only control verb today is `clear`,
//! which triggers a barge-in flush. Unknown verbs are logged and ignored so
//! the protocol can grow without breaking older relays.

use crate::pacer::Timing;
use crate::queue::ReceiveQueue;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// A parsed control message from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Discard all buffered audio and restart the output segment.
    Clear,
    /// A well-formed envelope with a verb this version does not know.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct ControlEnvelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Parse a text frame into a [`ControlMessage`].
///
/// Returns `None` for frames that are not valid control envelopes; the
/// caller logs and drops those rather than tearing down the connection.
pub fn parse_control(text: &str) -> Option<ControlMessage> {
    match serde_json::from_str::<ControlEnvelope>(text) {
        Ok(envelope) if envelope.kind == "clear" => Some(ControlMessage::Clear),
        Ok(envelope) => Some(ControlMessage::Unknown(envelope.kind)),
        Err(error) => {
            warn!(%error, "Ignoring malformed control message");
            None
        }
    }
}

/// Apply a control message to the relay state.
pub(crate) fn apply_control(message: ControlMessage, queue: &ReceiveQueue, timing: &Timing) {
    match message {
        ControlMessage::Clear => {
            let flushed = queue.flush();
            timing.barge_in();
            info!(flushed, "Barge-in: cleared receive queue and reset stream offset");
        }
        ControlMessage::Unknown(kind) => {
            debug!(kind, "Ignoring unknown control message type");
        }
    }
}
