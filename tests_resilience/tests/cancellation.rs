//! Flight Receipt Tests
//!
//! Validates cancellation, progress updates and exactly-once settlement for
//! calls made with a flight receipt.

use core::time::Duration;
use rpc_core::{CallError, CallStatus, FlightReceipt, RequestOptions, Responder};
use rpc_logger::RpcActivity;
use serde_json::{json, Value};
use sim_transport::DeliveryMode;
use std::sync::{Arc, Mutex};
use tests_resilience::{test_bootstrap, test_bootstrap_with, LinkedPair};

fn receipt_options() -> RequestOptions {
    RequestOptions::new().with_flight_receipt(true)
}

fn receipt(pair: &LinkedPair, method: &str, options: RequestOptions) -> FlightReceipt {
    pair.left
        .call(method, vec![], options)
        .unwrap()
        .into_receipt()
        .expect("flight receipt requested")
}

/// Parks every responder for the test to answer by hand
fn parking_handler(pair: &LinkedPair, method: &str) -> Arc<Mutex<Vec<Responder>>> {
    let parked = Arc::new(Mutex::new(Vec::new()));
    let park = parked.clone();
    pair.right
        .add_deferred_handler(method, move |_, responder| park.lock().unwrap().push(responder));
    parked
}

/// Test: cancelling twice is the same as cancelling once
#[test]
fn test_cancel_is_idempotent() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    let receipt = receipt(&pair, "long", receipt_options());
    assert_eq!(receipt.status(), CallStatus::Sent);

    receipt.cancel();
    let after_first = (receipt.status(), receipt.try_result(), pair.left.pending_calls());
    receipt.cancel();
    let after_second = (receipt.status(), receipt.try_result(), pair.left.pending_calls());

    assert_eq!(after_first, after_second);
    assert_eq!(receipt.status(), CallStatus::Cancelled);
    assert_eq!(receipt.wait(), Err(CallError::Cancelled));
    assert_eq!(pair.left_logs.count(RpcActivity::CallCancelled), 1);
}

/// Test: a response arriving after cancel has no effect
#[test]
fn test_response_after_cancel_is_ignored() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    pair.right.add_request_handler("long", |_| Ok(json!("too late")));
    let receipt = receipt(&pair, "long", receipt_options());

    pair.right_transport.deliver_all();
    receipt.cancel();
    pair.left_transport.deliver_all();

    assert_eq!(receipt.status(), CallStatus::Cancelled);
    assert_eq!(pair.left_logs.count(RpcActivity::LateResponseDropped), 1);
}

/// Test: a timeout after cancel has no effect
#[test]
fn test_timeout_after_cancel_is_ignored() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    let receipt = receipt(
        &pair,
        "long",
        receipt_options().with_timeout(Duration::from_millis(10)),
    );
    receipt.cancel();
    pair.clock.advance_millis(10);
    assert_eq!(pair.left.poll_timeouts(), 0);
    assert_eq!(receipt.status(), CallStatus::Cancelled);
}

/// Test: cancel after resolution leaves the result alone
#[test]
fn test_cancel_after_resolution_is_noop() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right.add_request_handler("fast", |_| Ok(json!(1)));
    let receipt = receipt(&pair, "fast", receipt_options());
    assert_eq!(receipt.status(), CallStatus::Resolved);

    receipt.cancel();
    assert_eq!(receipt.status(), CallStatus::Resolved);
    assert_eq!(receipt.try_result(), Some(Ok(json!(1))));
}

/// Test: cancellation is local; without notices nothing goes on the wire
#[test]
fn test_cancel_sends_nothing_by_default() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    let receipt = receipt(&pair, "long", receipt_options());
    receipt.cancel();
    assert_eq!(pair.left_transport.sent().len(), 1);
}

/// Test: with notices enabled the peer's handler sees the cancellation
#[test]
fn test_cancel_notice_reaches_handler() {
    let pair = test_bootstrap_with(
        DeliveryMode::Queued,
        |config| config.with_cancel_notices(true),
        |config| config,
    );
    let parked = parking_handler(&pair, "long");
    let receipt = receipt(&pair, "long", receipt_options());
    pair.pump();

    receipt.cancel();
    receipt.cancel();
    pair.pump();

    // One request plus exactly one notice
    assert_eq!(pair.left_transport.sent().len(), 2);
    assert_eq!(pair.right_logs.count(RpcActivity::CancelNoticeReceived), 1);

    let responder = parked.lock().unwrap().pop().unwrap();
    assert!(responder.is_cancelled());
    responder.resolve(Value::Null);
    pair.pump();
    assert_eq!(receipt.status(), CallStatus::Cancelled);
}

/// Test: progress updates reach listeners before the final result
#[test]
fn test_progress_then_result() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    pair.right.add_deferred_handler("download", |_, responder| {
        for percent in [25, 50, 75] {
            responder.progress(json!(percent));
        }
        responder.resolve(json!("done"));
    });

    let receipt = receipt(&pair, "download", receipt_options());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    receipt.on_progress(move |value| sink.lock().unwrap().push(value.clone()));

    pair.right_transport.deliver_all();
    assert_eq!(pair.left_transport.inbound_len(), 4);
    for _ in 0..3 {
        pair.left_transport.deliver_next();
        assert_eq!(receipt.status(), CallStatus::Sent);
    }
    pair.left_transport.deliver_next();

    assert_eq!(*seen.lock().unwrap(), vec![json!(25), json!(50), json!(75)]);
    assert_eq!(receipt.try_result(), Some(Ok(json!("done"))));
}

/// Test: progress arriving after cancellation is not delivered
#[test]
fn test_no_progress_after_cancel() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    let parked = parking_handler(&pair, "stream");
    let receipt = receipt(&pair, "stream", receipt_options());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    receipt.on_progress(move |value| sink.lock().unwrap().push(value.clone()));
    pair.pump();

    let responder = parked.lock().unwrap().pop().unwrap();
    responder.progress(json!(1));
    pair.pump();
    receipt.cancel();
    responder.progress(json!(2));
    responder.resolve(json!("end"));
    pair.pump();

    assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
    assert_eq!(receipt.status(), CallStatus::Cancelled);
}

/// Test: a blocked waiter wakes up when another thread cancels
#[test]
fn test_cancel_wakes_waiter() {
    let pair = test_bootstrap(DeliveryMode::Queued);
    let receipt = receipt(&pair, "long", receipt_options());
    let waiter = {
        let receipt = receipt.clone();
        std::thread::spawn(move || receipt.wait())
    };
    std::thread::sleep(Duration::from_millis(20));
    receipt.cancel();
    assert_eq!(waiter.join().unwrap(), Err(CallError::Cancelled));
}
