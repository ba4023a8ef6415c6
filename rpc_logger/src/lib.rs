//! # RPC Logger
//!
//! Structured logging for RPC endpoints.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style. Every
//! decision the router makes about a payload is an [`RpcActivity`], carried in
//! a [`LogEntry`] with typed fields, and handed to whatever [`LogSink`] the
//! endpoint was configured with. The default sink forwards to the `log` facade.

use rpc_types::SenderId;
use std::fmt;
use std::sync::Mutex;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl LogLevel {
    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// What the endpoint was doing when it logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcActivity {
    TransportSendingPayload,
    TransportReceivingMessage,
    TransportStopping,
    EchoIgnored,
    PreparseRejected,
    PreparseReplaced,
    InvalidPayloadDropped,
    ChannelMismatchDropped,
    RequestDispatched,
    DuplicateRequestDropped,
    MethodNotFound,
    HandlerFailed,
    ResponseCorrelated,
    ProgressDelivered,
    LateResponseDropped,
    CallTimedOut,
    CallCancelled,
    CancelNoticeReceived,
    TimerUnavailable,
}

impl RpcActivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcActivity::TransportSendingPayload => "transport.sending",
            RpcActivity::TransportReceivingMessage => "transport.receiving",
            RpcActivity::TransportStopping => "transport.stopping",
            RpcActivity::EchoIgnored => "inbound.echo_ignored",
            RpcActivity::PreparseRejected => "inbound.preparse_rejected",
            RpcActivity::PreparseReplaced => "inbound.preparse_replaced",
            RpcActivity::InvalidPayloadDropped => "inbound.invalid_dropped",
            RpcActivity::ChannelMismatchDropped => "inbound.channel_mismatch",
            RpcActivity::RequestDispatched => "request.dispatched",
            RpcActivity::DuplicateRequestDropped => "request.duplicate_dropped",
            RpcActivity::MethodNotFound => "request.method_not_found",
            RpcActivity::HandlerFailed => "request.handler_failed",
            RpcActivity::ResponseCorrelated => "response.correlated",
            RpcActivity::ProgressDelivered => "response.progress",
            RpcActivity::LateResponseDropped => "response.late_dropped",
            RpcActivity::CallTimedOut => "call.timed_out",
            RpcActivity::CallCancelled => "call.cancelled",
            RpcActivity::CancelNoticeReceived => "call.cancel_notice",
            RpcActivity::TimerUnavailable => "timer.unavailable",
        }
    }
}

impl fmt::Display for RpcActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Activity that produced the entry
    pub activity: RpcActivity,
    /// Endpoint that logged (if known)
    pub source: Option<SenderId>,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, activity: RpcActivity, message: impl Into<String>) -> Self {
        Self {
            level,
            activity,
            source: None,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Sets the source endpoint
    pub fn with_source(mut self, source: SenderId) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Returns the value of a field, if present
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Destination for structured log entries
pub trait LogSink: Send + Sync {
    fn log(&self, entry: LogEntry);
}

/// Forwards entries to the `log` crate facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, entry: LogEntry) {
        let level = entry.level.as_log_level();
        if !log::log_enabled!(target: "rpc", level) {
            return;
        }
        let fields = entry
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        match &entry.source {
            Some(source) => log::log!(
                target: "rpc",
                level,
                "[{}] {} {} {}",
                source,
                entry.activity,
                entry.message,
                fields
            ),
            None => log::log!(
                target: "rpc",
                level,
                "{} {} {}",
                entry.activity,
                entry.message,
                fields
            ),
        }
    }
}

/// Discards every entry
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _entry: LogEntry) {}
}

/// Keeps every entry in memory (for tests and inspection)
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every entry logged so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Counts entries for one activity
    pub fn count(&self, activity: RpcActivity) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|entry| entry.activity == activity)
            .count()
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, entry: LogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}
