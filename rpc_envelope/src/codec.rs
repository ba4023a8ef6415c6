//! Byte framing for transports that move bytes rather than values
//!
//! Payloads are JSON, the same encoding every envelope already uses.

use crate::error::EnvelopeError;
use crate::transport::WirePayload;

/// Serializes a payload to JSON bytes
pub fn encode_payload(payload: &WirePayload) -> Result<Vec<u8>, EnvelopeError> {
    serde_json::to_vec(payload).map_err(|err| EnvelopeError::Codec(err.to_string()))
}

/// Parses JSON bytes into a payload
///
/// Only the JSON syntax is checked here; use
/// [`Envelope::from_payload`](crate::Envelope::from_payload) for structure.
pub fn decode_payload(bytes: &[u8]) -> Result<WirePayload, EnvelopeError> {
    serde_json::from_slice(bytes).map_err(|err| EnvelopeError::Codec(err.to_string()))
}
