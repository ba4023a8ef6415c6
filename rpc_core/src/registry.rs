//! Request handler registry
//!
//! Maps method names to local callables. Lookup checks direct handlers first,
//! then delegates in registration order; the first match wins.

use crate::responder::Responder;
use rpc_envelope::{RemoteError, RequestEnvelope};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Positional arguments of an inbound call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(args: Vec<Value>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Decodes one argument
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, HandlerFault> {
        let value = self
            .0
            .get(index)
            .cloned()
            .ok_or_else(|| HandlerFault::new(format!("missing argument {}", index)))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Decodes the whole argument list, e.g. into a tuple
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, HandlerFault> {
        Ok(serde_json::from_value(Value::Array(self.0.clone()))?)
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

/// Failure returned by a handler; becomes a `HandlerError` response
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct HandlerFault {
    pub message: String,
    pub data: Option<Value>,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn into_remote_error(self) -> RemoteError {
        let error = RemoteError::handler_error(self.message);
        match self.data {
            Some(data) => error.with_data(data),
            None => error,
        }
    }
}

impl From<String> for HandlerFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerFault {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid arguments: {}", err))
    }
}

type SyncFn = dyn Fn(Args) -> Result<Value, HandlerFault> + Send + Sync;
type DeferredFn = dyn Fn(Args, Responder) + Send + Sync;

/// A registered callable
#[derive(Clone)]
pub enum Handler {
    /// Returns its result before dispatch finishes
    Sync(Arc<SyncFn>),
    /// Answers through the responder, now or later
    Deferred(Arc<DeferredFn>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Args) -> Result<Value, HandlerFault> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(Args, Responder) + Send + Sync + 'static,
    {
        Handler::Deferred(Arc::new(f))
    }

    /// Runs the handler; failures and panics end up on the responder
    fn invoke(&self, args: Args, responder: Responder) {
        match self {
            Handler::Sync(f) => match panic::catch_unwind(AssertUnwindSafe(|| f(args))) {
                Ok(Ok(value)) => responder.resolve(value),
                Ok(Err(fault)) => responder.reject_with(fault.into_remote_error()),
                Err(payload) => responder.reject(panic_message(payload.as_ref())),
            },
            Handler::Deferred(f) => {
                // An unwinding handler drops the responder, which answers for it.
                let _ = panic::catch_unwind(AssertUnwindSafe(|| f(args, responder)));
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Deferred(_) => f.write_str("Handler::Deferred"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}

/// Explicit capability descriptor: the methods an object exposes
#[derive(Debug, Clone, Default)]
pub struct Delegate {
    methods: HashMap<String, Handler>,
}

impl Delegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Result<Value, HandlerFault> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Handler::sync(f));
        self
    }

    pub fn deferred_method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args, Responder) + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Handler::deferred(f));
        self
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Option<&Handler> {
        self.methods.get(name)
    }
}

/// Which delegate methods are reachable remotely
///
/// With a prefix, only remote names starting with it reach the delegate, and
/// the prefix is stripped before lookup. The allow-list and deny-list are
/// glob patterns (`*` matches any run of characters) applied to the stripped
/// name; deny wins over allow, and no allow-list means everything is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateFilter {
    pub allow: Option<Vec<String>>,
    pub deny: Vec<String>,
    pub prefix: Option<String>,
}

impl DelegateFilter {
    /// Exposes every method of the delegate
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn allow<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow
            .get_or_insert_with(Vec::new)
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn deny<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Maps a remote method name to the delegate method name, if permitted
    pub fn local_name<'a>(&self, remote_name: &'a str) -> Option<&'a str> {
        let name = match &self.prefix {
            Some(prefix) => remote_name.strip_prefix(prefix.as_str())?,
            None => remote_name,
        };
        if name.is_empty() {
            return None;
        }
        if self.deny.iter().any(|pattern| glob_match(pattern, name)) {
            return None;
        }
        match &self.allow {
            Some(allow) if !allow.iter().any(|pattern| glob_match(pattern, name)) => None,
            _ => Some(name),
        }
    }
}

/// Matches `name` against a pattern where `*` stands for any run of characters
fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if p < pattern.len() && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if let Some((star_p, star_n)) = star {
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[derive(Default)]
struct RegistryInner {
    direct: HashMap<String, Handler>,
    delegates: Vec<(Delegate, DelegateFilter)>,
}

/// Resolves method names to handlers and invokes them
#[derive(Default)]
pub struct HandlerRegistry {
    inner: RwLock<RegistryInner>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a direct handler, replacing any previous one with that name
    pub fn add_request_handler<F>(&self, method_name: impl Into<String>, f: F)
    where
        F: Fn(Args) -> Result<Value, HandlerFault> + Send + Sync + 'static,
    {
        self.add_handler(method_name, Handler::sync(f));
    }

    /// Registers a handler that answers through its [`Responder`]
    pub fn add_deferred_handler<F>(&self, method_name: impl Into<String>, f: F)
    where
        F: Fn(Args, Responder) + Send + Sync + 'static,
    {
        self.add_handler(method_name, Handler::deferred(f));
    }

    /// Registers an already-built handler
    pub fn add_handler(&self, method_name: impl Into<String>, handler: Handler) {
        self.write().direct.insert(method_name.into(), handler);
    }

    /// Bulk form of [`add_handler`](Self::add_handler)
    pub fn add_request_handlers<I, S>(&self, handlers: I)
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: Into<String>,
    {
        let mut inner = self.write();
        for (name, handler) in handlers {
            inner.direct.insert(name.into(), handler);
        }
    }

    /// Registers a delegate behind a filter
    pub fn add_request_handler_delegate(&self, delegate: Delegate, filter: DelegateFilter) {
        self.write().delegates.push((delegate, filter));
    }

    /// Finds the handler for a method name
    pub fn resolve(&self, method_name: &str) -> Option<Handler> {
        let inner = self.read();
        if let Some(handler) = inner.direct.get(method_name) {
            return Some(handler.clone());
        }
        inner.delegates.iter().find_map(|(delegate, filter)| {
            filter
                .local_name(method_name)
                .and_then(|local| delegate.get(local))
                .cloned()
        })
    }

    pub fn has_handler(&self, method_name: &str) -> bool {
        self.resolve(method_name).is_some()
    }

    /// Names of direct handlers, sorted
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().direct.keys().cloned().collect();
        names.sort();
        names
    }

    /// Answers a validated request through `responder`
    ///
    /// Unknown methods get `MethodNotFound`; handler errors and panics get
    /// `HandlerError`. Nothing escapes to the caller of this method.
    pub fn on_validated_request(&self, request: &RequestEnvelope, responder: Responder) {
        // The lock is released before the handler runs, so handlers may register more handlers.
        match self.resolve(&request.method_name) {
            Some(handler) => handler.invoke(Args::new(request.args.clone()), responder),
            None => responder.reject_with(RemoteError::method_not_found(&request.method_name)),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("HandlerRegistry")
            .field("direct", &inner.direct.len())
            .field("delegates", &inner.delegates.len())
            .finish()
    }
}
