//! Responder: the handler's side of one inbound call.
//!
//! Every dispatched request gets exactly one `Responder`. It must be finished
//! with [`Responder::resolve`] or one of the reject methods; if it is dropped
//! unfinished, a `HandlerError` response is sent automatically so the caller
//! is never left waiting on a handler that forgot to answer.
//!
//! A responder can be moved to another thread or kept until a later turn of
//! the reactor. That is how asynchronous handlers are expressed.

use rpc_envelope::{RemoteError, RequestEnvelope, ResponseEnvelope};
use rpc_types::{CallId, ChannelName, SenderId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Where a responder delivers its responses
pub trait ResponseSink: Send + Sync {
    /// Delivers one response; progress responses may be followed by more
    fn send_response(&self, response: ResponseEnvelope);

    /// Whether the caller asked to cancel this call
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F> ResponseSink for F
where
    F: Fn(ResponseEnvelope) + Send + Sync,
{
    fn send_response(&self, response: ResponseEnvelope) {
        self(response)
    }
}

/// Reply handle for one inbound request
pub struct Responder {
    call_id: CallId,
    channel: ChannelName,
    method_name: String,
    responder_id: SenderId,
    sink: Arc<dyn ResponseSink>,
    finished: bool,
}

impl Responder {
    /// Creates a responder answering `request` as `responder_id`
    pub fn new(
        request: &RequestEnvelope,
        responder_id: SenderId,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            call_id: request.call_id.clone(),
            channel: request.channel.clone(),
            method_name: request.method_name.clone(),
            responder_id,
            sink,
            finished: false,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Whether the caller sent a cancel notice for this call
    pub fn is_cancelled(&self) -> bool {
        self.sink.is_cancelled()
    }

    /// Sends an intermediate update; the call stays open
    pub fn progress(&self, value: Value) {
        self.sink.send_response(ResponseEnvelope::progress(
            self.call_id.clone(),
            self.channel.clone(),
            self.responder_id.clone(),
            value,
        ));
    }

    /// Finishes the call with a result
    pub fn resolve(mut self, value: Value) {
        self.finish(ResponseEnvelope::result(
            self.call_id.clone(),
            self.channel.clone(),
            self.responder_id.clone(),
            value,
        ));
    }

    /// Finishes the call with a `HandlerError`
    pub fn reject(self, message: impl Into<String>) {
        self.reject_with(RemoteError::handler_error(message));
    }

    /// Finishes the call with a specific error body
    pub fn reject_with(mut self, error: RemoteError) {
        self.finish(ResponseEnvelope::error(
            self.call_id.clone(),
            self.channel.clone(),
            self.responder_id.clone(),
            error,
        ));
    }

    fn finish(&mut self, response: ResponseEnvelope) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.sink.send_response(response);
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if !self.finished {
            let response = ResponseEnvelope::error(
                self.call_id.clone(),
                self.channel.clone(),
                self.responder_id.clone(),
                RemoteError::handler_error("handler dropped the responder without replying"),
            );
            self.finish(response);
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("call_id", &self.call_id)
            .field("method_name", &self.method_name)
            .field("finished", &self.finished)
            .finish()
    }
}
