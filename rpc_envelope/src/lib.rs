//! # RPC Envelopes
//!
//! This crate defines the self-describing messages exchanged between two RPC
//! endpoints, and the transport contract that carries them.
//!
//! ## Philosophy
//!
//! - **Plain data on the wire**: Envelopes become a `serde_json::Value` before
//!   they reach a transport, so any channel that can move JSON can carry them
//! - **Validate at the edge**: Inbound payloads are structurally checked before
//!   anything else looks at them; a payload that fails is simply not an envelope
//! - **Correlation by id**: Every response carries the `callId` of the request
//!   that caused it, and nothing else is used for matching
//!
//! ## Architecture
//!
//! ```text
//! RequestEnvelope  { callId, methodName, args, senderId, channel, createdAt }
//! ResponseEnvelope { callId, channel, senderId, result | error, isProgress }
//! ```
//!
//! [`Envelope::from_payload`] is the single structural validator. The
//! [`Transport`] trait is implemented outside this workspace's core; the
//! `sim_transport` crate provides an in-memory one.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod transport;

pub use codec::{decode_payload, encode_payload};
pub use envelope::{Envelope, RequestEnvelope, ResponseEnvelope, ResponseOutcome};
pub use error::{EnvelopeError, ErrorKind, RemoteError};
pub use transport::{MessageListener, Transport, WirePayload};
