//! Wire error bodies and envelope validation errors

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error kinds carried in a response envelope's `error.kind`
///
/// Kinds are plain strings on the wire. Kinds this crate does not know are
/// kept verbatim in [`ErrorKind::Other`] so nothing a peer says is lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    /// No handler is registered for the requested method
    MethodNotFound,
    /// The handler failed, panicked, or never replied
    HandlerError,
    /// No response arrived before the call's deadline
    Timeout,
    /// The method was not registered locally as callable
    MethodNotRegistered,
    /// The caller cancelled the call
    Cancelled,
    /// The endpoint was stopped while the call was outstanding
    TransportStopped,
    /// Any other kind reported by a peer
    Other(String),
}

impl ErrorKind {
    /// Returns the wire spelling of the kind
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::MethodNotFound => "MethodNotFound",
            ErrorKind::HandlerError => "HandlerError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::MethodNotRegistered => "MethodNotRegistered",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::TransportStopped => "TransportStopped",
            ErrorKind::Other(kind) => kind,
        }
    }
}

impl From<String> for ErrorKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "MethodNotFound" => ErrorKind::MethodNotFound,
            "HandlerError" => ErrorKind::HandlerError,
            "Timeout" => ErrorKind::Timeout,
            "MethodNotRegistered" => ErrorKind::MethodNotRegistered,
            "Cancelled" => ErrorKind::Cancelled,
            "TransportStopped" => ErrorKind::TransportStopped,
            _ => ErrorKind::Other(kind),
        }
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried by a response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Error sent when no handler matches `method_name`
    pub fn method_not_found(method_name: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotFound,
            format!("no handler registered for method '{}'", method_name),
        )
    }

    /// Error sent when a handler fails
    pub fn handler_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandlerError, message)
    }
}

/// Reasons an inbound payload is not a valid envelope
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("Payload is not an object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field has the wrong type: {0}")]
    WrongType(&'static str),

    #[error("Payload is neither a request nor a response")]
    NotAnEnvelope,

    #[error("Payload mixes request and response fields")]
    Ambiguous,

    #[error("Codec error: {0}")]
    Codec(String),
}
