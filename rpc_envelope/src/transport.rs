//! Transport contract
//!
//! A transport is whatever moves plain payloads between two endpoints: an IPC
//! bridge, a socket, a window-messaging API. It gives no ordering, delivery or
//! timing guarantees, and the RPC layer assumes none.

use std::sync::Arc;

/// Plain serializable payload handed to and received from a transport
pub type WirePayload = serde_json::Value;

/// Callback invoked for every inbound payload
pub type MessageListener = Box<dyn Fn(WirePayload) + Send + Sync>;

/// Raw send/receive primitive underneath an RPC endpoint
///
/// Contract:
/// - exactly one active listener; a second `listen` replaces the first
/// - after `stop_transport`, `send_message` and `listen` are silent no-ops
pub trait Transport: Send + Sync {
    /// Sends one payload to the peer, best effort
    fn send_message(&self, payload: WirePayload);

    /// Installs the listener for inbound payloads
    fn listen(&self, on_message: MessageListener);

    /// Stops the transport and drops the listener
    fn stop_transport(&self);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_message(&self, payload: WirePayload) {
        (**self).send_message(payload)
    }

    fn listen(&self, on_message: MessageListener) {
        (**self).listen(on_message)
    }

    fn stop_transport(&self) {
        (**self).stop_transport()
    }
}
