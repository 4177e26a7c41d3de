// src/protocol/envelope.rs

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TaskRunnerError};

/// An inbound message as handed over by the transport: the raw payload bytes
/// plus the caller's signature.
///
/// The payload is not interpreted here; decoding it into a task request is
/// part of dispatch so that malformed payloads are reported there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Envelope {
    pub fn new(payload: impl Into<Vec<u8>>, signature: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            signature: signature.into(),
        }
    }

    /// Convenience for callers that already hold a JSON payload.
    pub fn from_json(payload: &serde_json::Value, signature: impl Into<Vec<u8>>) -> Result<Self> {
        Ok(Self::new(serde_json::to_vec(payload)?, signature))
    }
}

/// Line framing used by the TCP transport:
/// `{"payload": <json>, "signature": "<opaque>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub signature: String,
}

impl WireEnvelope {
    pub fn into_envelope(self) -> Result<Envelope> {
        let payload = serde_json::to_vec(&self.payload)?;
        Ok(Envelope::new(payload, self.signature.into_bytes()))
    }
}

/// Parse one framed line into an [`Envelope`].
pub fn decode_wire_line(line: &str) -> Result<Envelope> {
    let line = line.trim();
    if line.is_empty() {
        return Err(TaskRunnerError::Transport("empty frame".to_string()));
    }
    let wire: WireEnvelope = serde_json::from_str(line)?;
    wire.into_envelope()
}
