//! Unique identifiers for calls, endpoints and channels

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Channel every endpoint uses unless configured otherwise
pub const DEFAULT_CHANNEL: &str = "CommonChannel";

/// Unique identifier for an outbound call
///
/// Call ids are opaque strings on the wire. Locally generated ids are
/// UUID v4, so they are unique per sender for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Creates a new random call ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an id received from a peer
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Call({})", self.0)
    }
}

/// Identity of an endpoint, stamped on every message it sends
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    /// Creates a random sender ID
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Creates a sender ID from a caller-chosen name
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether the id is usable on the wire
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sender({})", self.0)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Namespace string partitioning RPC instances that share one transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Creates a channel name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether the name is usable on the wire
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ChannelName {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_creation() {
        let id1 = CallId::new();
        let id2 = CallId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_call_id_from_string() {
        let id = CallId::from_string("abc");
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn test_sender_id_random_is_unique() {
        let a = SenderId::random();
        let b = SenderId::random();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_default_channel() {
        assert_eq!(ChannelName::default().as_str(), DEFAULT_CHANNEL);
    }

    #[test]
    fn test_call_id_display() {
        let id = CallId::from_string("x1");
        assert_eq!(format!("{}", id), "Call(x1)");
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = CallId::from_string("c-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"c-1\"");

        let sender: SenderId = serde_json::from_str("\"peer\"").unwrap();
        assert_eq!(sender.as_str(), "peer");
    }
}
