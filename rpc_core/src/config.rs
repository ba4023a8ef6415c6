//! Endpoint configuration
//!
//! [`RpcConfig`] is built in code with `with_*` methods. The plain-data part
//! can also come from JSON through [`RpcSettings`].

use crate::error::ConfigError;
use crate::options::RequestOptions;
use core::time::Duration;
use rpc_envelope::WirePayload;
use rpc_logger::{LogCrateSink, LogSink};
use rpc_types::{ChannelName, Clock, SenderId, SystemClock};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Verdict of the preparse hook on one inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Preparse {
    /// Use the payload unchanged
    Accept,
    /// Treat the payload as invalid and drop it
    Reject,
    /// Use this payload instead
    Replace(WirePayload),
}

/// Hook run on every inbound payload before validation
pub type PreparseHook = Arc<dyn Fn(&WirePayload) -> Preparse + Send + Sync>;

/// Configuration for one RPC endpoint
#[derive(Clone)]
pub struct RpcConfig {
    pub channel: ChannelName,
    pub sender_id: SenderId,
    /// Reject outbound calls to methods not added with `add_remote_method_names`
    pub require_remote_method_registration: bool,
    /// Endpoint-wide tier of request options
    pub default_request_options: RequestOptions,
    /// Send a best-effort `rpc.cancel` notice when a flight receipt is cancelled
    pub send_cancel_notices: bool,
    pub preparse: Option<PreparseHook>,
    pub logger: Arc<dyn LogSink>,
    pub clock: Arc<dyn Clock>,
    /// Fire call deadlines from a background thread sleeping on the wall clock
    pub timeout_timer: bool,
}

impl RpcConfig {
    pub fn new() -> Self {
        Self {
            channel: ChannelName::default(),
            sender_id: SenderId::random(),
            require_remote_method_registration: false,
            default_request_options: RequestOptions::new(),
            send_cancel_notices: false,
            preparse: None,
            logger: Arc::new(LogCrateSink),
            clock: Arc::new(SystemClock::new()),
            timeout_timer: true,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<ChannelName>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_sender_id(mut self, sender_id: impl Into<SenderId>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    pub fn with_required_remote_method_registration(mut self, required: bool) -> Self {
        self.require_remote_method_registration = required;
        self
    }

    pub fn with_default_request_options(mut self, options: RequestOptions) -> Self {
        self.default_request_options = options;
        self
    }

    pub fn with_cancel_notices(mut self, enabled: bool) -> Self {
        self.send_cancel_notices = enabled;
        self
    }

    pub fn with_preparse<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WirePayload) -> Preparse + Send + Sync + 'static,
    {
        self.preparse = Some(Arc::new(hook));
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = logger;
        self
    }

    /// Replaces the time source
    ///
    /// The background timer sleeps on the wall clock, so a custom clock turns
    /// it off. Deadlines then fire from `poll_timeouts`, from later traffic and
    /// from handles that observe them. Call [`RpcConfig::with_timeout_timer`]
    /// afterwards to keep it.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.timeout_timer = false;
        self
    }

    pub fn with_timeout_timer(mut self, enabled: bool) -> Self {
        self.timeout_timer = enabled;
        self
    }

    /// Applies loaded settings on top of this configuration
    pub fn apply_settings(mut self, settings: &RpcSettings) -> Self {
        if let Some(channel) = &settings.channel {
            self.channel = ChannelName::new(channel.as_str());
        }
        if let Some(sender_id) = &settings.sender_id {
            self.sender_id = SenderId::new(sender_id.as_str());
        }
        self.require_remote_method_registration = settings.require_remote_method_registration;
        self.send_cancel_notices = settings.send_cancel_notices;
        if let Some(timeout_ms) = settings.default_timeout_ms {
            self.default_request_options = self
                .default_request_options
                .with_timeout(Duration::from_millis(timeout_ms));
        }
        if settings.use_flight_receipts {
            self.default_request_options = self.default_request_options.with_flight_receipt(true);
        }
        self
    }

    /// Builds a configuration from settings, defaults everywhere else
    pub fn from_settings(settings: &RpcSettings) -> Self {
        Self::new().apply_settings(settings)
    }

    /// Checks that the configuration can be used on the wire
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        if self.sender_id.is_empty() {
            return Err(ConfigError::EmptySenderId);
        }
        Ok(())
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("channel", &self.channel)
            .field("sender_id", &self.sender_id)
            .field(
                "require_remote_method_registration",
                &self.require_remote_method_registration,
            )
            .field("default_request_options", &self.default_request_options)
            .field("send_cancel_notices", &self.send_cancel_notices)
            .field("preparse", &self.preparse.is_some())
            .field("timeout_timer", &self.timeout_timer)
            .finish_non_exhaustive()
    }
}

/// Serializable subset of [`RpcConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcSettings {
    pub channel: Option<String>,
    pub sender_id: Option<String>,
    pub require_remote_method_registration: bool,
    pub default_timeout_ms: Option<u64>,
    pub send_cancel_notices: bool,
    pub use_flight_receipts: bool,
}

impl RpcSettings {
    /// Parses settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::InvalidSettings(err.to_string()))
    }
}
