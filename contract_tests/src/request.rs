//! Request envelope contract
//!
//! A request is a flat object; `methodName` is what marks it as a request.

use serde_json::{json, Value};

// ===== Field Names =====
pub const FIELD_CALL_ID: &str = "callId";
pub const FIELD_METHOD_NAME: &str = "methodName";
pub const FIELD_ARGS: &str = "args";
pub const FIELD_SENDER_ID: &str = "senderId";
pub const FIELD_CHANNEL: &str = "channel";
pub const FIELD_CREATED_AT: &str = "createdAt";

pub const REQUEST_FIELDS: [&str; 6] = [
    FIELD_CALL_ID,
    FIELD_METHOD_NAME,
    FIELD_ARGS,
    FIELD_SENDER_ID,
    FIELD_CHANNEL,
    FIELD_CREATED_AT,
];

/// Canonical request as a peer would send it
pub fn golden_request() -> Value {
    json!({
        "callId": "3f1c2d4e-0000-4000-8000-000000000001",
        "methodName": "add",
        "args": [2, 3],
        "senderId": "peer-a",
        "channel": "CommonChannel",
        "createdAt": 1700000000000u64
    })
}

// ===== Contract Tests =====
