//! Router: outbound dispatch and inbound correlation
//!
//! The router owns the transport. Outbound calls get a pending record keyed
//! by call id; inbound payloads go through the preparse hook and structural
//! validation, then requests go to the registry and responses settle their
//! pending record.
//!
//! No lock is held while calling the transport, a handler or a listener, so
//! a transport that delivers synchronously from inside `send_message` is fine.

use crate::config::{Preparse, PreparseHook, RpcConfig};
use crate::error::CallError;
use crate::flight_receipt::{CallControl, CallHandle};
use crate::registry::HandlerRegistry;
use crate::remote_request::{CallSlot, CallStatus, RemoteRequest};
use crate::responder::{Responder, ResponseSink};
use crate::sync::lock;
use crate::timer::{self, DeadlineQueue, Tick, TimerSignal};
use rpc_envelope::{
    Envelope, ErrorKind, RequestEnvelope, ResponseEnvelope, ResponseOutcome, Transport,
    WirePayload,
};
use rpc_logger::{LogEntry, LogLevel, LogSink, RpcActivity};
use rpc_types::{CallId, ChannelName, Clock, Instant, SenderId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Reserved method carrying a best-effort cancel notice; `args: [callId]`
pub const CANCEL_METHOD: &str = "rpc.cancel";

/// Pending Call Record
struct PendingCall {
    method_name: String,
    requested_at: Instant,
    timeout_at: Option<Instant>,
    channel: ChannelName,
    slot: Arc<CallSlot>,
}

type InboundKey = (SenderId, CallId);

/// Correlation engine for one endpoint
pub struct Router {
    shared: Arc<RouterShared>,
}

pub(crate) struct RouterShared {
    channel: ChannelName,
    sender_id: SenderId,
    send_cancel_notices: bool,
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    preparse: RwLock<Option<PreparseHook>>,
    pending: Mutex<HashMap<CallId, PendingCall>>,
    inbound: Mutex<HashMap<InboundKey, Arc<AtomicBool>>>,
    logger: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    timer: Arc<TimerSignal>,
    stopped: AtomicBool,
}

impl Router {
    /// Creates a router and registers it as the transport's listener
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<HandlerRegistry>,
        config: &RpcConfig,
    ) -> Self {
        let shared = Arc::new(RouterShared {
            channel: config.channel.clone(),
            sender_id: config.sender_id.clone(),
            send_cancel_notices: config.send_cancel_notices,
            transport,
            registry,
            preparse: RwLock::new(config.preparse.clone()),
            pending: Mutex::new(HashMap::new()),
            inbound: Mutex::new(HashMap::new()),
            logger: config.logger.clone(),
            clock: config.clock.clone(),
            timer: Arc::new(TimerSignal::default()),
            stopped: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&shared);
        shared.transport.listen(Box::new(move |payload: WirePayload| {
            if let Some(router) = weak.upgrade() {
                router.on_message(payload);
            }
        }));

        if config.timeout_timer {
            if let Err(err) = timer::spawn(Arc::downgrade(&shared), shared.timer.clone()) {
                shared
                    .log(LogLevel::Warn, RpcActivity::TimerUnavailable, "timeout timer not started")
                    .field("error", err)
                    .emit();
            }
        }

        Self { shared }
    }

    pub fn sender_id(&self) -> &SenderId {
        &self.shared.sender_id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.shared.channel
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.shared.registry
    }

    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    /// Replaces the preparse hook
    pub fn set_preparse_hook(&self, hook: Option<PreparseHook>) {
        *self
            .shared
            .preparse
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = hook;
    }

    /// Registers the pending record, sends the envelope and returns its handle
    pub fn send_remote_request(&self, request: RemoteRequest) -> Result<CallHandle, CallError> {
        self.shared.send_remote_request(request)
    }

    /// Processes one inbound payload as if the transport had delivered it
    pub fn handle_payload(&self, payload: WirePayload) {
        self.shared.on_message(payload);
    }

    /// Settles every call whose deadline has passed; returns how many timed out
    pub fn poll_timeouts(&self) -> usize {
        self.shared.poll_timeouts()
    }

    /// Earliest deadline among pending calls
    pub fn next_deadline(&self) -> Option<Instant> {
        lock(&self.shared.pending)
            .values()
            .filter_map(|call| call.timeout_at)
            .min()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.poll_timeouts();
        lock(&self.shared.pending).len()
    }

    /// Ids of calls still awaiting settlement, sorted
    pub fn pending_calls(&self) -> Vec<CallId> {
        self.shared.poll_timeouts();
        let mut ids: Vec<CallId> = lock(&self.shared.pending).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of inbound requests whose handlers have not answered yet
    pub fn inbound_in_flight(&self) -> usize {
        lock(&self.shared.inbound).len()
    }

    /// Stops the transport and rejects every pending call
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }
}

impl RouterShared {
    fn log(&self, level: LogLevel, activity: RpcActivity, message: impl Into<String>) -> LogBuilder<'_> {
        LogBuilder {
            sink: self.logger.as_ref(),
            entry: LogEntry::new(level, activity, message).with_source(self.sender_id.clone()),
        }
    }

    fn send_remote_request(self: &Arc<Self>, mut request: RemoteRequest) -> Result<CallHandle, CallError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CallError::Stopped);
        }
        self.poll_timeouts();

        let now = self.clock.now();
        let prepared = {
            let mut pending = lock(&self.pending);
            while pending.contains_key(request.call_id()) {
                request.regenerate_call_id();
            }
            let prepared = request.prepare(now);
            pending.insert(
                prepared.envelope.call_id.clone(),
                PendingCall {
                    method_name: prepared.envelope.method_name.clone(),
                    requested_at: prepared.requested_at,
                    timeout_at: prepared.slot.deadline(),
                    channel: prepared.envelope.channel.clone(),
                    slot: prepared.slot.clone(),
                },
            );
            prepared
        };

        // A stop that raced with the insert above would miss this record
        if self.stopped.load(Ordering::SeqCst) {
            lock(&self.pending).remove(&prepared.envelope.call_id);
            prepared
                .slot
                .finish(CallStatus::Rejected, Err(CallError::Stopped));
            return Err(CallError::Stopped);
        }
        if prepared.slot.deadline().is_some() {
            self.timer.notify();
        }

        let control: Weak<dyn CallControl> = Arc::downgrade(self) as Weak<dyn CallControl>;
        let handle = CallHandle::new(prepared.slot.clone(), control, prepared.flight_receipt);

        self.log(LogLevel::Debug, RpcActivity::TransportSendingPayload, "sending request")
            .field("callId", prepared.envelope.call_id.as_str())
            .field("methodName", &prepared.envelope.method_name)
            .emit();
        let payload = Envelope::from(prepared.envelope).to_payload();
        self.transport.send_message(payload);
        prepared.slot.mark_sent();

        Ok(handle)
    }

    fn send_payload(&self, payload: WirePayload) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.transport.send_message(payload);
    }

    fn on_message(self: &Arc<Self>, payload: WirePayload) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.poll_timeouts();

        let hook = self
            .preparse
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let payload = match hook.map(|hook| hook(&payload)) {
            None | Some(Preparse::Accept) => payload,
            Some(Preparse::Reject) => {
                self.log(LogLevel::Debug, RpcActivity::PreparseRejected, "preparse hook rejected payload")
                    .emit();
                return;
            }
            Some(Preparse::Replace(replacement)) => {
                self.log(LogLevel::Debug, RpcActivity::PreparseReplaced, "preparse hook replaced payload")
                    .emit();
                replacement
            }
        };

        let envelope = match Envelope::from_payload(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.log(LogLevel::Debug, RpcActivity::InvalidPayloadDropped, "dropping invalid payload")
                    .field("reason", err)
                    .emit();
                return;
            }
        };

        if envelope.sender_id() == &self.sender_id {
            self.log(LogLevel::Debug, RpcActivity::EchoIgnored, "ignoring own payload")
                .field("callId", envelope.call_id().as_str())
                .emit();
            return;
        }

        self.log(LogLevel::Debug, RpcActivity::TransportReceivingMessage, "received envelope")
            .field("callId", envelope.call_id().as_str())
            .field("senderId", envelope.sender_id().as_str())
            .emit();

        match envelope {
            Envelope::Request(request) => self.on_request(request),
            Envelope::Response(response) => self.on_response(response),
        }
    }

    fn on_request(self: &Arc<Self>, request: RequestEnvelope) {
        if request.channel != self.channel {
            self.log(LogLevel::Debug, RpcActivity::ChannelMismatchDropped, "request for another channel")
                .field("channel", request.channel.as_str())
                .emit();
            return;
        }

        if request.method_name == CANCEL_METHOD {
            self.on_cancel_notice(&request);
            return;
        }

        let key = (request.sender_id.clone(), request.call_id.clone());
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut inbound = lock(&self.inbound);
            if inbound.contains_key(&key) {
                drop(inbound);
                self.log(LogLevel::Warn, RpcActivity::DuplicateRequestDropped, "duplicate in-flight request")
                    .field("callId", request.call_id.as_str())
                    .field("senderId", request.sender_id.as_str())
                    .emit();
                return;
            }
            inbound.insert(key.clone(), cancelled.clone());
        }

        self.log(LogLevel::Debug, RpcActivity::RequestDispatched, "dispatching request")
            .field("callId", request.call_id.as_str())
            .field("methodName", &request.method_name)
            .emit();

        let sink = Arc::new(InboundCall {
            router: Arc::downgrade(self),
            key,
            cancelled,
        });
        let responder = Responder::new(&request, self.sender_id.clone(), sink);
        self.registry.on_validated_request(&request, responder);
    }

    fn on_cancel_notice(&self, request: &RequestEnvelope) {
        let Some(call_id) = request.args.first().and_then(Value::as_str) else {
            self.log(LogLevel::Debug, RpcActivity::InvalidPayloadDropped, "cancel notice without call id")
                .emit();
            return;
        };
        let key = (request.sender_id.clone(), CallId::from_string(call_id));
        let flag = lock(&self.inbound).get(&key).cloned();
        self.log(LogLevel::Debug, RpcActivity::CancelNoticeReceived, "cancel notice received")
            .field("callId", call_id)
            .field("inFlight", flag.is_some())
            .emit();
        if let Some(flag) = flag {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn on_response(&self, response: ResponseEnvelope) {
        enum Step {
            Progress(Arc<CallSlot>),
            Settle(PendingCall),
            Mismatch,
            Unknown,
        }

        let step = {
            let mut pending = lock(&self.pending);
            let found = pending
                .get(&response.call_id)
                .map(|call| (call.channel == response.channel, call.slot.clone()));
            match found {
                None => Step::Unknown,
                Some((false, _)) => Step::Mismatch,
                Some((true, slot)) if response.is_progress => Step::Progress(slot),
                Some((true, _)) => pending
                    .remove(&response.call_id)
                    .map_or(Step::Unknown, Step::Settle),
            }
        };

        match step {
            Step::Unknown => {
                self.log(LogLevel::Debug, RpcActivity::LateResponseDropped, "no pending call for response")
                    .field("callId", response.call_id.as_str())
                    .emit();
            }
            Step::Mismatch => {
                self.log(LogLevel::Debug, RpcActivity::ChannelMismatchDropped, "response on another channel")
                    .field("callId", response.call_id.as_str())
                    .field("channel", response.channel.as_str())
                    .emit();
            }
            Step::Progress(slot) => match response.result_value() {
                Some(value) => {
                    slot.notify_progress(value);
                    self.log(LogLevel::Debug, RpcActivity::ProgressDelivered, "progress delivered")
                        .field("callId", response.call_id.as_str())
                        .emit();
                }
                None => {
                    self.log(LogLevel::Debug, RpcActivity::InvalidPayloadDropped, "progress update carrying an error")
                        .field("callId", response.call_id.as_str())
                        .emit();
                }
            },
            Step::Settle(call) => {
                let (status, outcome) = match response.outcome {
                    ResponseOutcome::Result(value) => (CallStatus::Resolved, Ok(value)),
                    ResponseOutcome::Error(error) => (CallStatus::Rejected, Err(CallError::Remote(error))),
                };
                if call.slot.finish(status, outcome) {
                    self.log(LogLevel::Debug, RpcActivity::ResponseCorrelated, "response correlated")
                        .field("callId", response.call_id.as_str())
                        .field("methodName", &call.method_name)
                        .field("status", status)
                        .emit();
                } else {
                    self.log(LogLevel::Debug, RpcActivity::LateResponseDropped, "call already settled")
                        .field("callId", response.call_id.as_str())
                        .emit();
                }
            }
        }
    }

    fn poll_timeouts(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<PendingCall> = {
            let mut pending = lock(&self.pending);
            let ids: Vec<CallId> = pending
                .iter()
                .filter(|(_, call)| call.timeout_at.is_some_and(|at| at <= now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        expired
            .into_iter()
            .filter(|call| self.settle_timeout(call))
            .count()
    }

    fn settle_timeout(&self, call: &PendingCall) -> bool {
        let after_ms = call
            .timeout_at
            .map(|at| at.duration_since(call.requested_at).as_millis() as u64)
            .unwrap_or_default();
        let settled = call.slot.finish(
            CallStatus::TimedOut,
            Err(CallError::Timeout {
                method: call.method_name.clone(),
                after_ms,
            }),
        );
        if settled {
            self.log(LogLevel::Info, RpcActivity::CallTimedOut, "call timed out")
                .field("callId", call.slot.call_id().as_str())
                .field("methodName", &call.method_name)
                .field("afterMs", after_ms)
                .emit();
        }
        settled
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.log(LogLevel::Info, RpcActivity::TransportStopping, "stopping transport")
            .emit();
        self.timer.shutdown();
        self.transport.stop_transport();

        let drained: Vec<PendingCall> = lock(&self.pending).drain().map(|(_, call)| call).collect();
        for call in drained {
            call.slot
                .finish(CallStatus::Rejected, Err(CallError::Stopped));
        }
        for (_, flag) in lock(&self.inbound).drain() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

impl CallControl for RouterShared {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn expire_call(&self, call_id: &CallId) -> bool {
        let now = self.clock.now();
        let call = {
            let mut pending = lock(&self.pending);
            match pending.get(call_id) {
                Some(call) if call.timeout_at.is_some_and(|at| at <= now) => pending.remove(call_id),
                _ => None,
            }
        };
        match call {
            Some(call) => self.settle_timeout(&call),
            None => false,
        }
    }

    fn cancel_call(&self, call_id: &CallId) {
        let removed = lock(&self.pending).remove(call_id);
        let Some(call) = removed else {
            return;
        };
        if !call.slot.finish(CallStatus::Cancelled, Err(CallError::Cancelled)) {
            return;
        }
        self.log(LogLevel::Debug, RpcActivity::CallCancelled, "call cancelled")
            .field("callId", call_id.as_str())
            .field("methodName", &call.method_name)
            .emit();

        if self.send_cancel_notices {
            let notice = RequestEnvelope::new(
                CallId::new(),
                CANCEL_METHOD,
                vec![Value::String(call_id.as_str().to_string())],
                self.sender_id.clone(),
                call.channel,
                self.clock.now().as_millis(),
            );
            self.send_payload(Envelope::from(notice).to_payload());
        }
    }
}

impl DeadlineQueue for RouterShared {
    fn tick(&self) -> Tick {
        if self.stopped.load(Ordering::SeqCst) {
            return Tick::Finished;
        }
        self.poll_timeouts();
        let now = self.clock.now();
        let next = lock(&self.pending)
            .values()
            .filter_map(|call| call.timeout_at)
            .min();
        Tick::Sleep(next.map(|deadline| deadline.duration_since(now)))
    }
}

impl Drop for RouterShared {
    fn drop(&mut self) {
        self.timer.shutdown();
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, call) in pending.drain() {
            call.slot
                .finish(CallStatus::Rejected, Err(CallError::Stopped));
        }
    }
}

/// Response sink for one inbound request
struct InboundCall {
    router: Weak<RouterShared>,
    key: InboundKey,
    cancelled: Arc<AtomicBool>,
}

impl ResponseSink for InboundCall {
    fn send_response(&self, response: ResponseEnvelope) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        if !response.is_progress {
            lock(&router.inbound).remove(&self.key);
        }
        if let Some(error) = response.error_body() {
            let activity = match error.kind {
                ErrorKind::MethodNotFound => RpcActivity::MethodNotFound,
                _ => RpcActivity::HandlerFailed,
            };
            router
                .log(LogLevel::Warn, activity, "request failed")
                .field("callId", response.call_id.as_str())
                .field("error", error)
                .emit();
        }
        router.send_payload(Envelope::from(response).to_payload());
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct LogBuilder<'a> {
    sink: &'a dyn LogSink,
    entry: LogEntry,
}

impl LogBuilder<'_> {
    fn field(mut self, key: &str, value: impl ToString) -> Self {
        self.entry = self.entry.with_field(key, value);
        self
    }

    fn emit(self) {
        self.sink.log(self.entry);
    }
}
