//! Remote Request: one outbound call before and during transit
//!
//! A [`RemoteRequest`] becomes a [`RequestEnvelope`] plus a [`CallSlot`]. The
//! slot is shared between the router's pending record and the caller's
//! handle; whoever settles it first wins.

use crate::error::CallError;
use crate::options::ResolvedRequestOptions;
use crate::sync::lock;
use core::time::Duration;
use rpc_envelope::RequestEnvelope;
use rpc_types::{CallId, Instant};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

/// Lifecycle of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatus {
    Created,
    Sent,
    Resolved,
    Rejected,
    TimedOut,
    Cancelled,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallStatus::Created | CallStatus::Sent)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatus::Created => "Created",
            CallStatus::Sent => "Sent",
            CallStatus::Resolved => "Resolved",
            CallStatus::Rejected => "Rejected",
            CallStatus::TimedOut => "TimedOut",
            CallStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

pub(crate) type ProgressListener = Arc<dyn Fn(&Value) + Send + Sync>;

struct SlotState {
    status: CallStatus,
    outcome: Option<Result<Value, CallError>>,
    progress_listeners: Vec<ProgressListener>,
}

/// Settlement point of one call
pub struct CallSlot {
    call_id: CallId,
    method_name: String,
    deadline: Option<Instant>,
    state: Mutex<SlotState>,
    settled: Condvar,
}

impl CallSlot {
    pub(crate) fn new(call_id: CallId, method_name: String, deadline: Option<Instant>) -> Self {
        Self {
            call_id,
            method_name,
            deadline,
            state: Mutex::new(SlotState {
                status: CallStatus::Created,
                outcome: None,
                progress_listeners: Vec::new(),
            }),
            settled: Condvar::new(),
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn status(&self) -> CallStatus {
        lock(&self.state).status
    }

    /// Moves `Created` to `Sent`; a call settled during the send stays settled
    pub(crate) fn mark_sent(&self) -> bool {
        let mut state = lock(&self.state);
        if state.status == CallStatus::Created {
            state.status = CallStatus::Sent;
            true
        } else {
            false
        }
    }

    /// Settles the call; returns false if it was already terminal
    pub(crate) fn finish(&self, status: CallStatus, outcome: Result<Value, CallError>) -> bool {
        debug_assert!(status.is_terminal());
        let mut state = lock(&self.state);
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.outcome = Some(outcome);
        state.progress_listeners.clear();
        drop(state);
        self.settled.notify_all();
        true
    }

    pub fn try_result(&self) -> Option<Result<Value, CallError>> {
        lock(&self.state).outcome.clone()
    }

    pub(crate) fn add_progress_listener(&self, listener: ProgressListener) {
        let mut state = lock(&self.state);
        if !state.status.is_terminal() {
            state.progress_listeners.push(listener);
        }
    }

    /// Runs the progress listeners without holding the slot lock
    pub(crate) fn notify_progress(&self, value: &Value) -> bool {
        let listeners = {
            let state = lock(&self.state);
            if state.status.is_terminal() {
                return false;
            }
            state.progress_listeners.clone()
        };
        for listener in listeners {
            listener(value);
        }
        true
    }

    /// Blocks for at most `limit` until the call settles
    pub(crate) fn wait_for(&self, limit: Option<Duration>) -> Option<Result<Value, CallError>> {
        let state = lock(&self.state);
        if state.outcome.is_some() {
            return state.outcome.clone();
        }
        let state = match limit {
            Some(limit) => {
                self.settled
                    .wait_timeout_while(state, limit, |s| s.outcome.is_none())
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .0
            }
            None => self
                .settled
                .wait_while(state, |s| s.outcome.is_none())
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        };
        state.outcome.clone()
    }
}

impl fmt::Debug for CallSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSlot")
            .field("call_id", &self.call_id)
            .field("method_name", &self.method_name)
            .field("status", &self.status())
            .finish()
    }
}

/// An outbound call with its resolved options
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    call_id: CallId,
    method_name: String,
    args: Vec<Value>,
    options: ResolvedRequestOptions,
}

/// What the router needs once a request is committed to the wire
pub(crate) struct PreparedCall {
    pub envelope: RequestEnvelope,
    pub slot: Arc<CallSlot>,
    pub requested_at: Instant,
    pub flight_receipt: bool,
}

impl RemoteRequest {
    pub fn new(method_name: impl Into<String>, args: Vec<Value>, options: ResolvedRequestOptions) -> Self {
        Self {
            call_id: CallId::new(),
            method_name: method_name.into(),
            args,
            options,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn options(&self) -> &ResolvedRequestOptions {
        &self.options
    }

    /// Picks a fresh call id; used when the current one is still pending
    pub(crate) fn regenerate_call_id(&mut self) {
        self.call_id = CallId::new();
    }

    /// Builds the wire envelope, stamped at `now`
    pub fn to_envelope(&self, now: Instant) -> RequestEnvelope {
        RequestEnvelope::new(
            self.call_id.clone(),
            self.method_name.clone(),
            self.args.clone(),
            self.options.sender_id.clone(),
            self.options.channel.clone(),
            now.as_millis(),
        )
    }

    pub(crate) fn prepare(self, now: Instant) -> PreparedCall {
        let envelope = self.to_envelope(now);
        let deadline = self.options.timeout.deadline_from(now);
        PreparedCall {
            envelope,
            slot: Arc::new(CallSlot::new(self.call_id, self.method_name, deadline)),
            requested_at: now,
            flight_receipt: self.options.flight_receipt,
        }
    }
}
