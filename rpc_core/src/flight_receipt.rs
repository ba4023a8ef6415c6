//! Call handles: the plain one-shot reply and the cancellable Flight Receipt
//!
//! Both wrap the same [`CallSlot`]. A handle keeps only a weak link back to
//! the router, so holding a handle never keeps an endpoint alive.

use crate::error::CallError;
use crate::remote_request::{CallSlot, CallStatus};
use core::time::Duration;
use rpc_types::{CallId, Instant};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

/// Upper bound on one blocking slice while a deadline is pending
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Router operations a handle may trigger
pub(crate) trait CallControl: Send + Sync {
    fn now(&self) -> Instant;

    /// Settles the call as timed out if its deadline has passed
    fn expire_call(&self, call_id: &CallId) -> bool;

    /// Detaches and cancels the call
    fn cancel_call(&self, call_id: &CallId);
}

#[derive(Clone)]
struct HandleCore {
    slot: Arc<CallSlot>,
    control: Weak<dyn CallControl>,
}

impl HandleCore {
    fn wait(&self) -> Result<Value, CallError> {
        loop {
            if let Some(outcome) = self.slot.try_result() {
                return outcome;
            }
            let Some(control) = self.control.upgrade() else {
                // Router gone; its drop settled every pending slot
                return self.slot.wait_for(None).unwrap_or(Err(CallError::Stopped));
            };
            let limit = match self.slot.deadline() {
                Some(deadline) => {
                    let now = control.now();
                    if deadline <= now {
                        if !control.expire_call(self.slot.call_id()) {
                            // Someone else is settling it right now
                            drop(control);
                            self.slot.wait_for(Some(Duration::from_millis(1)));
                        }
                        continue;
                    }
                    Some(deadline.duration_since(now).min(WAIT_SLICE))
                }
                None => None,
            };
            drop(control);
            if let Some(outcome) = self.slot.wait_for(limit) {
                return outcome;
            }
        }
    }

    /// Settles the call as timed out if its deadline passed unnoticed
    fn expire_if_due(&self) {
        let Some(deadline) = self.slot.deadline() else {
            return;
        };
        if self.slot.status().is_terminal() {
            return;
        }
        if let Some(control) = self.control.upgrade() {
            if deadline <= control.now() {
                control.expire_call(self.slot.call_id());
            }
        }
    }

    fn status(&self) -> CallStatus {
        self.expire_if_due();
        self.slot.status()
    }

    fn try_result(&self) -> Option<Result<Value, CallError>> {
        self.expire_if_due();
        self.slot.try_result()
    }

    fn wait_as<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        let value = self.wait()?;
        serde_json::from_value(value).map_err(|err| CallError::Decode(err.to_string()))
    }
}

/// Plain handle for a call that only needs its eventual value
#[derive(Clone)]
pub struct PendingReply {
    core: HandleCore,
}

impl PendingReply {
    pub fn call_id(&self) -> &CallId {
        self.core.slot.call_id()
    }

    /// Returns the outcome if the call has settled
    pub fn try_result(&self) -> Option<Result<Value, CallError>> {
        self.core.try_result()
    }

    pub fn is_settled(&self) -> bool {
        self.core.status().is_terminal()
    }

    /// Blocks until the call settles
    pub fn wait(&self) -> Result<Value, CallError> {
        self.core.wait()
    }

    /// Blocks until the call settles and decodes the result
    pub fn wait_as<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        self.core.wait_as()
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("call_id", self.call_id())
            .field("status", &self.core.slot.status())
            .finish()
    }
}

/// Cancellable, inspectable handle for an in-flight call
///
/// Status is read-only here; only the router moves it forward.
#[derive(Clone)]
pub struct FlightReceipt {
    core: HandleCore,
}

impl FlightReceipt {
    pub fn call_id(&self) -> &CallId {
        self.core.slot.call_id()
    }

    pub fn method_name(&self) -> &str {
        self.core.slot.method_name()
    }

    /// Current state; a call past its deadline reports `TimedOut`
    pub fn status(&self) -> CallStatus {
        self.core.status()
    }

    /// Cancels the call locally; no-op once terminal
    ///
    /// After this returns, no response or timeout can settle the call.
    pub fn cancel(&self) {
        if self.status().is_terminal() {
            return;
        }
        if let Some(control) = self.core.control.upgrade() {
            control.cancel_call(self.call_id());
        }
        // A response or timeout may have detached the record without settling it yet
        self.core
            .slot
            .finish(CallStatus::Cancelled, Err(CallError::Cancelled));
    }

    /// Registers a listener for progress updates sent before the final result
    pub fn on_progress<F>(&self, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.core.slot.add_progress_listener(Arc::new(listener));
    }

    pub fn try_result(&self) -> Option<Result<Value, CallError>> {
        self.core.try_result()
    }

    pub fn wait(&self) -> Result<Value, CallError> {
        self.core.wait()
    }

    pub fn wait_as<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        self.core.wait_as()
    }
}

impl fmt::Debug for FlightReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightReceipt")
            .field("call_id", self.call_id())
            .field("status", &self.core.slot.status())
            .finish()
    }
}

/// Result of sending a call; the variant is picked by the `flight_receipt` option
#[derive(Debug, Clone)]
pub enum CallHandle {
    Reply(PendingReply),
    Receipt(FlightReceipt),
}

impl CallHandle {
    pub(crate) fn new(slot: Arc<CallSlot>, control: Weak<dyn CallControl>, flight_receipt: bool) -> Self {
        let core = HandleCore { slot, control };
        if flight_receipt {
            CallHandle::Receipt(FlightReceipt { core })
        } else {
            CallHandle::Reply(PendingReply { core })
        }
    }

    pub fn call_id(&self) -> &CallId {
        match self {
            CallHandle::Reply(reply) => reply.call_id(),
            CallHandle::Receipt(receipt) => receipt.call_id(),
        }
    }

    pub fn status(&self) -> CallStatus {
        self.core().status()
    }

    pub fn try_result(&self) -> Option<Result<Value, CallError>> {
        self.core().try_result()
    }

    pub fn wait(&self) -> Result<Value, CallError> {
        self.core().wait()
    }

    pub fn wait_as<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        self.core().wait_as()
    }

    /// Returns the receipt, if one was requested
    pub fn into_receipt(self) -> Option<FlightReceipt> {
        match self {
            CallHandle::Receipt(receipt) => Some(receipt),
            CallHandle::Reply(_) => None,
        }
    }

    pub fn into_reply(self) -> Option<PendingReply> {
        match self {
            CallHandle::Reply(reply) => Some(reply),
            CallHandle::Receipt(_) => None,
        }
    }

    fn core(&self) -> &HandleCore {
        match self {
            CallHandle::Reply(reply) => &reply.core,
            CallHandle::Receipt(receipt) => &receipt.core,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::lock;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Stand-in router: a manual clock and one slot it can expire or cancel
    struct FakeControl {
        now_ms: AtomicU64,
        slot: Arc<CallSlot>,
        cancels: AtomicUsize,
        cancelled_ids: Mutex<Vec<CallId>>,
        /// When false, cancel_call finds the record already detached
        owns_record: AtomicBool,
    }

    impl CallControl for FakeControl {
        fn now(&self) -> Instant {
            Instant::from_millis(self.now_ms.load(Ordering::SeqCst))
        }

        fn expire_call(&self, _call_id: &CallId) -> bool {
            match self.slot.deadline() {
                Some(deadline) if deadline <= self.now() => self.slot.finish(
                    CallStatus::TimedOut,
                    Err(CallError::Timeout {
                        method: self.slot.method_name().to_string(),
                        after_ms: 50,
                    }),
                ),
                _ => false,
            }
        }

        fn cancel_call(&self, call_id: &CallId) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            lock(&self.cancelled_ids).push(call_id.clone());
            if self.owns_record.load(Ordering::SeqCst) {
                self.slot
                    .finish(CallStatus::Cancelled, Err(CallError::Cancelled));
            }
        }
    }

    fn fixture(deadline: Option<Instant>, receipt: bool) -> (Arc<FakeControl>, CallHandle) {
        let slot = Arc::new(CallSlot::new(CallId::from_string("c1"), "work".to_string(), deadline));
        slot.mark_sent();
        let control = Arc::new(FakeControl {
            now_ms: AtomicU64::new(0),
            slot: slot.clone(),
            cancels: AtomicUsize::new(0),
            cancelled_ids: Mutex::new(Vec::new()),
            owns_record: AtomicBool::new(true),
        });
        let weak: Weak<FakeControl> = Arc::downgrade(&control);
        let handle = CallHandle::new(slot, weak, receipt);
        (control, handle)
    }

    #[test]
    fn test_variant_follows_option() {
        let (_control, reply) = fixture(None, false);
        assert!(matches!(reply, CallHandle::Reply(_)));
        let (_control, receipt) = fixture(None, true);
        assert!(receipt.into_receipt().is_some());
    }

    #[test]
    fn test_wait_returns_settled_value() {
        let (control, handle) = fixture(None, false);
        control.slot.finish(CallStatus::Resolved, Ok(json!(5)));
        assert_eq!(handle.wait(), Ok(json!(5)));
        assert_eq!(handle.wait_as::<i64>(), Ok(5));
    }

    #[test]
    fn test_wait_as_reports_decode_errors() {
        let (control, handle) = fixture(None, false);
        control.slot.finish(CallStatus::Resolved, Ok(json!("five")));
        assert!(matches!(handle.wait_as::<i64>(), Err(CallError::Decode(_))));
    }

    #[test]
    fn test_wait_expires_past_deadline() {
        let (control, handle) = fixture(Some(Instant::from_millis(50)), false);
        control.now_ms.store(50, Ordering::SeqCst);
        assert!(matches!(handle.wait(), Err(CallError::Timeout { .. })));
        assert_eq!(handle.status(), CallStatus::TimedOut);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (control, handle) = fixture(None, true);
        let receipt = handle.into_receipt().unwrap();
        receipt.cancel();
        receipt.cancel();
        assert_eq!(receipt.status(), CallStatus::Cancelled);
        assert_eq!(control.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(lock(&control.cancelled_ids).as_slice(), &[CallId::from_string("c1")]);
        assert_eq!(receipt.wait(), Err(CallError::Cancelled));
    }

    #[test]
    fn test_status_expires_past_deadline_without_waiting() {
        let (control, handle) = fixture(Some(Instant::from_millis(50)), true);
        control.now_ms.store(49, Ordering::SeqCst);
        assert_eq!(handle.status(), CallStatus::Sent);
        assert!(handle.try_result().is_none());

        control.now_ms.store(50, Ordering::SeqCst);
        assert_eq!(handle.status(), CallStatus::TimedOut);
        assert!(matches!(handle.try_result(), Some(Err(CallError::Timeout { .. }))));
    }

    #[test]
    fn test_is_settled_expires_past_deadline() {
        let (control, handle) = fixture(Some(Instant::from_millis(50)), false);
        let reply = handle.into_reply().unwrap();
        assert!(!reply.is_settled());
        control.now_ms.store(80, Ordering::SeqCst);
        assert!(reply.is_settled());
    }

    #[test]
    fn test_cancel_settles_when_record_already_detached() {
        let (control, handle) = fixture(None, true);
        control.owns_record.store(false, Ordering::SeqCst);
        let receipt = handle.into_receipt().unwrap();

        receipt.cancel();
        assert_eq!(receipt.status(), CallStatus::Cancelled);
        assert_eq!(control.cancels.load(Ordering::SeqCst), 1);
        // The detached response arriving now cannot settle it
        assert!(!control.slot.finish(CallStatus::Resolved, Ok(json!(1))));
        assert_eq!(receipt.try_result(), Some(Err(CallError::Cancelled)));
    }

    #[test]
    fn test_cancel_after_resolution_is_noop() {
        let (control, handle) = fixture(None, true);
        control.slot.finish(CallStatus::Resolved, Ok(json!(1)));
        let receipt = handle.into_receipt().unwrap();
        receipt.cancel();
        assert_eq!(receipt.status(), CallStatus::Resolved);
        assert_eq!(control.cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_without_router_settles_locally() {
        let (control, handle) = fixture(None, true);
        drop(control);
        let receipt = handle.into_receipt().unwrap();
        receipt.cancel();
        assert_eq!(receipt.status(), CallStatus::Cancelled);
    }

    #[test]
    fn test_progress_listener_receives_updates() {
        let (control, handle) = fixture(None, true);
        let receipt = handle.into_receipt().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        receipt.on_progress(move |value| lock(&sink).push(value.clone()));

        control.slot.notify_progress(&json!(10));
        control.slot.notify_progress(&json!(20));
        assert_eq!(*lock(&seen), vec![json!(10), json!(20)]);
    }
}
