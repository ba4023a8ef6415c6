//! Response envelope contract
//!
//! Exactly one of `result` / `error` is present. `isProgress` appears only on
//! intermediate updates.

use serde_json::{json, Value};

// ===== Field Names =====
pub const FIELD_CALL_ID: &str = "callId";
pub const FIELD_CHANNEL: &str = "channel";
pub const FIELD_SENDER_ID: &str = "senderId";
pub const FIELD_RESULT: &str = "result";
pub const FIELD_ERROR: &str = "error";
pub const FIELD_IS_PROGRESS: &str = "isProgress";

// ===== Error Kinds =====
pub const KIND_METHOD_NOT_FOUND: &str = "MethodNotFound";
pub const KIND_HANDLER_ERROR: &str = "HandlerError";
pub const KIND_TIMEOUT: &str = "Timeout";
pub const KIND_METHOD_NOT_REGISTERED: &str = "MethodNotRegistered";
pub const KIND_CANCELLED: &str = "Cancelled";
pub const KIND_TRANSPORT_STOPPED: &str = "TransportStopped";

/// Canonical error response as a peer would send it
pub fn golden_error_response() -> Value {
    json!({
        "callId": "c1",
        "channel": "CommonChannel",
        "senderId": "peer-b",
        "error": {"kind": "MethodNotFound", "message": "no handler registered for method 'missing'"}
    })
}

// ===== Contract Tests =====
