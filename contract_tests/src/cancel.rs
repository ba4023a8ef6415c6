//! Cancel notice contract
//!
//! A cancel notice is an ordinary request for a reserved method whose only
//! argument is the id of the call being cancelled. It is never answered.

use rpc_core::CANCEL_METHOD;

pub const CANCEL_METHOD_NAME: &str = "rpc.cancel";

/// The reserved name must not change without a protocol bump
pub fn cancel_method_is_stable() -> bool {
    CANCEL_METHOD == CANCEL_METHOD_NAME
}

// ===== Contract Tests =====
