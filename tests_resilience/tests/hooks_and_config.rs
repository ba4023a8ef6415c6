//! Endpoint Configuration Tests
//!
//! Validates the preparse hook, channel isolation, remote method
//! registration, settings loading and stop semantics across a live link.

use core::time::Duration;
use rpc_core::{
    CallError, CallHandle, CallStatus, Preparse, PreparseHook, RequestOptions, RpcSettings,
};
use rpc_envelope::ErrorKind;
use rpc_logger::RpcActivity;
use rpc_types::ChannelName;
use serde_json::{json, Value};
use sim_transport::DeliveryMode;
use std::sync::Arc;
use tests_resilience::{test_bootstrap, test_bootstrap_with};

fn short_timeout() -> RequestOptions {
    RequestOptions::new().with_timeout(Duration::from_millis(50))
}

/// Test: a rejecting preparse hook drops payloads before validation
#[test]
fn test_preparse_reject() {
    let pair = test_bootstrap_with(
        DeliveryMode::Immediate,
        |config| config,
        |config| config.with_preparse(|_| Preparse::Reject),
    );
    pair.right.add_request_handler("ping", |_| Ok(json!("pong")));

    let handle = pair.left.call("ping", vec![], short_timeout()).unwrap();
    assert!(handle.try_result().is_none());
    assert_eq!(pair.right_logs.count(RpcActivity::PreparseRejected), 1);
    assert_eq!(pair.right_transport.sent().len(), 0);

    pair.clock.advance_millis(50);
    pair.left.poll_timeouts();
    assert_eq!(handle.status(), CallStatus::TimedOut);
}

/// Test: a replacing hook can rewrite an inbound payload
#[test]
fn test_preparse_replace_rewrites_arguments() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right.add_request_handler("double", |args| {
        let n: i64 = args.arg(0)?;
        Ok(json!(n * 2))
    });
    let rewrite: PreparseHook = Arc::new(|payload: &Value| {
        if payload["methodName"] == json!("double") {
            let mut rewritten = payload.clone();
            rewritten["args"] = json!([21]);
            Preparse::Replace(rewritten)
        } else {
            Preparse::Accept
        }
    });
    pair.right.set_preparse_hook(Some(rewrite));

    let value = pair
        .left
        .call_and_wait("double", vec![json!(1)], RequestOptions::new())
        .unwrap();
    assert_eq!(value, json!(42));
    assert_eq!(pair.right_logs.count(RpcActivity::PreparseReplaced), 1);

    pair.right.set_preparse_hook(None);
    let value = pair
        .left
        .call_and_wait("double", vec![json!(1)], RequestOptions::new())
        .unwrap();
    assert_eq!(value, json!(2));
}

/// Test: endpoints on different channels never answer each other
#[test]
fn test_channel_isolation() {
    let pair = test_bootstrap_with(
        DeliveryMode::Immediate,
        |config| config.with_channel("alpha"),
        |config| config.with_channel("beta"),
    );
    pair.right.add_request_handler("ping", |_| Ok(json!("pong")));

    let handle = pair.left.call("ping", vec![], short_timeout()).unwrap();
    assert!(handle.try_result().is_none());
    assert_eq!(pair.right_logs.count(RpcActivity::ChannelMismatchDropped), 1);

    pair.clock.advance_millis(50);
    pair.left.poll_timeouts();
    assert_eq!(handle.try_result().unwrap().unwrap_err().kind(), ErrorKind::Timeout);
}

/// Test: a per-call channel override reaches a peer on that channel
#[test]
fn test_per_call_channel_override() {
    let pair = test_bootstrap_with(
        DeliveryMode::Immediate,
        |config| config.with_channel("alpha"),
        |config| config.with_channel("beta"),
    );
    pair.right.add_request_handler("ping", |_| Ok(json!("pong")));

    let value = pair
        .left
        .call_and_wait(
            "ping",
            vec![],
            RequestOptions::new().with_channel(ChannelName::new("beta")),
        )
        .unwrap();
    assert_eq!(value, json!("pong"));
}

/// Test: garbage on the wire is dropped without a reply
#[test]
fn test_invalid_payloads_are_dropped() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right.add_request_handler("ping", |_| Ok(json!("pong")));

    pair.right_transport.inject(json!({"type": "request", "methodName": "ping"}));
    pair.right_transport.inject(json!([1, 2, 3]));
    pair.right_transport.inject(json!("hello"));

    assert_eq!(pair.right_logs.count(RpcActivity::InvalidPayloadDropped), 3);
    assert!(pair.right_transport.sent().is_empty());

    let pong = pair
        .left
        .call_and_wait("ping", vec![], RequestOptions::new())
        .unwrap();
    assert_eq!(pong, json!("pong"));
}

/// Test: an endpoint ignores its own payloads coming back
#[test]
fn test_echo_is_ignored() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    pair.left.add_request_handler("ping", |_| Ok(json!("self")));
    let handle = pair.left.call("ping", vec![], RequestOptions::new()).unwrap();

    let own_request = pair.left_transport.sent().remove(0);
    pair.left_transport.inject(own_request);
    pair.left_transport.deliver_all();

    assert_eq!(pair.left_logs.count(RpcActivity::EchoIgnored), 1);
    assert_eq!(pair.left_transport.sent().len(), 1);
    assert_eq!(handle.status(), CallStatus::Sent);
}

/// Test: with registration required, unknown remote methods fail locally
#[test]
fn test_required_remote_method_registration() {
    let pair = test_bootstrap_with(
        DeliveryMode::Immediate,
        |config| config.with_required_remote_method_registration(true),
        |config| config,
    );
    pair.right.add_request_handler("known", |_| Ok(json!(1)));

    match pair.left.call("known", vec![], RequestOptions::new()) {
        Err(CallError::MethodNotRegistered(method)) => assert_eq!(method, "known"),
        Err(other) => panic!("expected MethodNotRegistered, got {:?}", other),
        Ok(_) => panic!("call should not have been sent"),
    }
    assert!(pair.left_transport.sent().is_empty());

    pair.left.add_remote_method_names(["known"]);
    let value = pair
        .left
        .call_and_wait("known", vec![], RequestOptions::new())
        .unwrap();
    assert_eq!(value, json!(1));
}

/// Test: settings loaded from JSON switch on flight receipts
#[test]
fn test_settings_enable_flight_receipts() {
    let settings = RpcSettings::from_json(r#"{"useFlightReceipts": true, "defaultTimeoutMs": 250}"#)
        .unwrap();
    let pair = test_bootstrap_with(
        DeliveryMode::Immediate,
        |config| config.apply_settings(&settings),
        |config| config,
    );
    pair.right.add_request_handler("ping", |_| Ok(json!("pong")));

    let handle = pair.left.call("ping", vec![], RequestOptions::new()).unwrap();
    assert!(matches!(handle, CallHandle::Receipt(_)));
    assert_eq!(handle.wait(), Ok(json!("pong")));

    let plain = pair
        .left
        .call("ping", vec![], RequestOptions::new().with_flight_receipt(false))
        .unwrap();
    assert!(matches!(plain, CallHandle::Reply(_)));
}

/// Test: malformed settings are reported instead of ignored
#[test]
fn test_malformed_settings_rejected() {
    assert!(RpcSettings::from_json(r#"{"defaultTimeoutMs": "soon"}"#).is_err());
    assert!(RpcSettings::from_json("not json").is_err());
}

/// Test: stop rejects pending calls, refuses new ones and keeps settled results
#[test]
fn test_stop_semantics() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    pair.right.add_request_handler("ping", |_| Ok(json!("pong")));

    let settled = pair.left.call("ping", vec![], RequestOptions::new()).unwrap();
    pair.pump();
    assert_eq!(settled.status(), CallStatus::Resolved);

    let pending = pair.left.call("ping", vec![], RequestOptions::new()).unwrap();
    pair.left.stop();
    pair.left.stop();

    assert!(pair.left.is_stopped());
    assert!(pair.left_transport.is_stopped());
    assert_eq!(pending.status(), CallStatus::Rejected);
    assert_eq!(pending.wait(), Err(CallError::Stopped));
    assert_eq!(settled.try_result(), Some(Ok(json!("pong"))));
    assert!(pair.left.pending_calls().is_empty());
    assert_eq!(pair.left_logs.count(RpcActivity::TransportStopping), 1);

    let refused = pair.left.call("ping", vec![], RequestOptions::new());
    assert!(matches!(refused, Err(CallError::Stopped)));

    // The peer's answer to the pending call goes nowhere
    pair.pump();
    assert_eq!(pending.status(), CallStatus::Rejected);
}

/// Test: calls into a stopped peer time out rather than hang
#[test]
fn test_stopped_peer_leads_to_timeout() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right.add_request_handler("ping", |_| Ok(json!("pong")));
    pair.right.stop();

    let handle = pair.left.call("ping", vec![], short_timeout()).unwrap();
    pair.clock.advance_millis(50);
    pair.left.poll_timeouts();
    assert_eq!(handle.status(), CallStatus::TimedOut);
}
