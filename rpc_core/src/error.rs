//! Error types surfaced to callers

use rpc_envelope::{ErrorKind, RemoteError};
use thiserror::Error;

/// Why a call did not produce a result
///
/// Every failure that originates from the peer or the environment arrives
/// through the same settlement channel as a success.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The peer answered with an error envelope
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// No response arrived before the deadline
    #[error("Call to '{method}' timed out after {after_ms}ms")]
    Timeout { method: String, after_ms: u64 },

    /// The caller cancelled the call
    #[error("Call was cancelled")]
    Cancelled,

    /// Remote method registration is required and this method is not registered
    #[error("Method not registered for remote calls: {0}")]
    MethodNotRegistered(String),

    /// The endpoint was stopped
    #[error("Endpoint stopped")]
    Stopped,

    /// The result did not have the expected shape
    #[error("Failed to decode result: {0}")]
    Decode(String),
}

impl CallError {
    /// Returns the error kind, using the same vocabulary as the wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::Remote(error) => error.kind.clone(),
            CallError::Timeout { .. } => ErrorKind::Timeout,
            CallError::Cancelled => ErrorKind::Cancelled,
            CallError::MethodNotRegistered(_) => ErrorKind::MethodNotRegistered,
            CallError::Stopped => ErrorKind::TransportStopped,
            CallError::Decode(_) => ErrorKind::Other("DecodeError".to_string()),
        }
    }
}

impl From<RemoteError> for CallError {
    fn from(error: RemoteError) -> Self {
        CallError::Remote(error)
    }
}

/// Invalid endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Channel name must not be empty")]
    EmptyChannel,

    #[error("Sender id must not be empty")]
    EmptySenderId,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}
