//! Request options and their three-tier resolution
//!
//! Options come from three layers: endpoint-wide defaults, per-method
//! defaults, and the individual call. Each field is resolved on its own and
//! the most specific layer that sets it wins.

use core::time::Duration;
use rpc_types::{ChannelName, Instant, SenderId};

/// Whether and when a call gives up waiting for its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Settle as timed out once this much time has passed since sending
    After(Duration),
    /// Wait for a response, cancellation or shutdown indefinitely
    Never,
}

impl TimeoutPolicy {
    /// Computes the deadline for a call sent at `now`
    pub fn deadline_from(&self, now: Instant) -> Option<Instant> {
        match self {
            TimeoutPolicy::After(duration) => Some(now + *duration),
            TimeoutPolicy::Never => None,
        }
    }
}

/// One layer of request options; unset fields defer to less specific layers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Option<TimeoutPolicy>,
    /// Return a cancellable [`FlightReceipt`](crate::FlightReceipt) instead of a plain reply
    pub flight_receipt: Option<bool>,
    pub sender_id: Option<SenderId>,
    pub channel: Option<ChannelName>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(TimeoutPolicy::After(timeout));
        self
    }

    /// Explicitly disables a timeout set by a less specific layer
    pub fn without_timeout(mut self) -> Self {
        self.timeout = Some(TimeoutPolicy::Never);
        self
    }

    pub fn with_flight_receipt(mut self, enabled: bool) -> Self {
        self.flight_receipt = Some(enabled);
        self
    }

    pub fn with_sender_id(mut self, sender_id: SenderId) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn with_channel(mut self, channel: ChannelName) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Returns `self` with any unset field taken from `base`
    pub fn layered_over(&self, base: &RequestOptions) -> RequestOptions {
        RequestOptions {
            timeout: self.timeout.or(base.timeout),
            flight_receipt: self.flight_receipt.or(base.flight_receipt),
            sender_id: self.sender_id.clone().or_else(|| base.sender_id.clone()),
            channel: self.channel.clone().or_else(|| base.channel.clone()),
        }
    }

    /// Resolves global < per-method < per-call, then fills the rest from the endpoint
    pub fn resolve(
        global: &RequestOptions,
        per_method: Option<&RequestOptions>,
        per_call: &RequestOptions,
        endpoint: &EndpointIdentity,
    ) -> ResolvedRequestOptions {
        let mut merged = global.clone();
        if let Some(method_layer) = per_method {
            merged = method_layer.layered_over(&merged);
        }
        merged = per_call.layered_over(&merged);

        ResolvedRequestOptions {
            timeout: merged.timeout.unwrap_or(TimeoutPolicy::Never),
            flight_receipt: merged.flight_receipt.unwrap_or(false),
            sender_id: merged
                .sender_id
                .unwrap_or_else(|| endpoint.sender_id.clone()),
            channel: merged.channel.unwrap_or_else(|| endpoint.channel.clone()),
        }
    }
}

/// Identity an endpoint stamps on calls when no layer overrides it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointIdentity {
    pub sender_id: SenderId,
    pub channel: ChannelName,
}

/// Fully resolved options for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequestOptions {
    pub timeout: TimeoutPolicy,
    pub flight_receipt: bool,
    pub sender_id: SenderId,
    pub channel: ChannelName,
}
