//! Delegate Tests
//!
//! Validates that a handler delegate only answers the method names its
//! filter lets through, and that everything else comes back MethodNotFound.

use rpc_core::{Delegate, DelegateFilter, RequestOptions};
use rpc_envelope::ErrorKind;
use serde_json::json;
use sim_transport::DeliveryMode;
use tests_resilience::{test_bootstrap, LinkedPair};

fn file_service() -> Delegate {
    Delegate::new()
        .method("foo", |_| Ok(json!("foo")))
        .method("bar", |_| Ok(json!("bar")))
        .method("read", |args| {
            let path: String = args.arg(0)?;
            Ok(json!(format!("contents of {}", path)))
        })
        .method("write", |_| Ok(json!(true)))
}

fn ask(pair: &LinkedPair, method: &str) -> Result<serde_json::Value, ErrorKind> {
    pair.left
        .call_and_wait(method, vec![json!("/tmp/a")], RequestOptions::new())
        .map_err(|err| err.kind())
}

/// Test: an allow list exposes exactly the named methods
#[test]
fn test_allow_list_scenario() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right
        .add_request_handler_delegate(file_service(), DelegateFilter::allow_all().allow(["foo"]));

    assert_eq!(ask(&pair, "foo"), Ok(json!("foo")));
    assert_eq!(ask(&pair, "bar"), Err(ErrorKind::MethodNotFound));
}

/// Test: denied methods stay hidden even when the allow list matches them
#[test]
fn test_deny_wins_over_allow() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right.add_request_handler_delegate(
        file_service(),
        DelegateFilter::allow_all().allow(["*"]).deny(["write"]),
    );

    assert_eq!(ask(&pair, "read"), Ok(json!("contents of /tmp/a")));
    assert_eq!(ask(&pair, "write"), Err(ErrorKind::MethodNotFound));
}

/// Test: a prefixed delegate answers only under its namespace
#[test]
fn test_prefixed_delegate() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right
        .add_request_handler_delegate(file_service(), DelegateFilter::allow_all().with_prefix("fs."));

    assert_eq!(ask(&pair, "fs.read"), Ok(json!("contents of /tmp/a")));
    assert_eq!(ask(&pair, "read"), Err(ErrorKind::MethodNotFound));
    assert_eq!(ask(&pair, "fs."), Err(ErrorKind::MethodNotFound));
}

/// Test: a directly registered handler shadows a delegate method of the same name
#[test]
fn test_direct_handler_shadows_delegate() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    pair.right
        .add_request_handler_delegate(file_service(), DelegateFilter::allow_all());
    pair.right.add_request_handler("foo", |_| Ok(json!("direct")));

    assert_eq!(ask(&pair, "foo"), Ok(json!("direct")));
    assert_eq!(ask(&pair, "bar"), Ok(json!("bar")));
}

/// Test: glob patterns in the allow list
#[test]
fn test_glob_allow_list() {
    let pair = test_bootstrap(DeliveryMode::Immediate);
    let delegate = Delegate::new()
        .method("get.user", |_| Ok(json!("user")))
        .method("get.group", |_| Ok(json!("group")))
        .method("set.user", |_| Ok(json!("set")));
    pair.right
        .add_request_handler_delegate(delegate, DelegateFilter::allow_all().allow(["get.*"]));

    assert_eq!(ask(&pair, "get.user"), Ok(json!("user")));
    assert_eq!(ask(&pair, "get.group"), Ok(json!("group")));
    assert_eq!(ask(&pair, "set.user"), Err(ErrorKind::MethodNotFound));
}
