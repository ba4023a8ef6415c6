//! RPC endpoint: the public surface
//!
//! Wires a [`Router`] to a [`HandlerRegistry`] over one transport and owns
//! the endpoint-wide and per-method request option tiers.

use crate::config::{PreparseHook, RpcConfig};
use crate::error::{CallError, ConfigError};
use crate::flight_receipt::CallHandle;
use crate::options::{EndpointIdentity, RequestOptions};
use crate::registry::{Args, Delegate, DelegateFilter, Handler, HandlerFault, HandlerRegistry};
use crate::remote_request::RemoteRequest;
use crate::responder::Responder;
use crate::router::Router;
use crate::sync::lock;
use rpc_envelope::Transport;
use rpc_types::{CallId, ChannelName, Instant, SenderId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct OptionTiers {
    global: RequestOptions,
    per_method: HashMap<String, RequestOptions>,
    remote_method_names: HashSet<String>,
}

/// One side of a bidirectional RPC link
pub struct RpcEndpoint {
    router: Router,
    registry: Arc<HandlerRegistry>,
    require_remote_method_registration: bool,
    tiers: Mutex<OptionTiers>,
}

impl RpcEndpoint {
    /// Creates an endpoint listening on `transport`
    pub fn new(transport: Arc<dyn Transport>, config: RpcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(HandlerRegistry::new());
        let router = Router::new(transport, registry.clone(), &config);
        Ok(Self {
            router,
            registry,
            require_remote_method_registration: config.require_remote_method_registration,
            tiers: Mutex::new(OptionTiers {
                global: config.default_request_options,
                ..OptionTiers::default()
            }),
        })
    }

    pub fn sender_id(&self) -> &SenderId {
        self.router.sender_id()
    }

    pub fn channel(&self) -> &ChannelName {
        self.router.channel()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn add_request_handler<F>(&self, method_name: impl Into<String>, f: F)
    where
        F: Fn(Args) -> Result<Value, HandlerFault> + Send + Sync + 'static,
    {
        self.registry.add_request_handler(method_name, f);
    }

    pub fn add_request_handlers<I, S>(&self, handlers: I)
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: Into<String>,
    {
        self.registry.add_request_handlers(handlers);
    }

    pub fn add_deferred_handler<F>(&self, method_name: impl Into<String>, f: F)
    where
        F: Fn(Args, Responder) + Send + Sync + 'static,
    {
        self.registry.add_deferred_handler(method_name, f);
    }

    pub fn add_request_handler_delegate(&self, delegate: Delegate, filter: DelegateFilter) {
        self.registry.add_request_handler_delegate(delegate, filter);
    }

    /// Declares methods the peer is known to expose
    pub fn add_remote_method_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.tiers)
            .remote_method_names
            .extend(names.into_iter().map(Into::into));
    }

    /// Replaces the endpoint-wide option tier
    pub fn set_default_request_options(&self, options: RequestOptions) {
        lock(&self.tiers).global = options;
    }

    /// Sets the option tier for one remote method
    pub fn set_default_request_options_for_method(
        &self,
        method_name: impl Into<String>,
        options: RequestOptions,
    ) {
        lock(&self.tiers)
            .per_method
            .insert(method_name.into(), options);
    }

    pub fn set_preparse_hook(&self, hook: Option<PreparseHook>) {
        self.router.set_preparse_hook(hook);
    }

    /// Calls a remote method
    ///
    /// Returns a [`CallHandle::Receipt`] when the resolved options ask for a
    /// flight receipt, a [`CallHandle::Reply`] otherwise.
    pub fn call(
        &self,
        method_name: &str,
        args: Vec<Value>,
        options: RequestOptions,
    ) -> Result<CallHandle, CallError> {
        let resolved = {
            let tiers = lock(&self.tiers);
            if self.require_remote_method_registration
                && !tiers.remote_method_names.contains(method_name)
            {
                return Err(CallError::MethodNotRegistered(method_name.to_string()));
            }
            let identity = EndpointIdentity {
                sender_id: self.router.sender_id().clone(),
                channel: self.router.channel().clone(),
            };
            RequestOptions::resolve(
                &tiers.global,
                tiers.per_method.get(method_name),
                &options,
                &identity,
            )
        };
        self.router
            .send_remote_request(RemoteRequest::new(method_name, args, resolved))
    }

    /// Calls a remote method and blocks until it settles
    pub fn call_and_wait(
        &self,
        method_name: &str,
        args: Vec<Value>,
        options: RequestOptions,
    ) -> Result<Value, CallError> {
        self.call(method_name, args, options)?.wait()
    }

    /// Settles calls whose deadline has passed; returns how many timed out
    pub fn poll_timeouts(&self) -> usize {
        self.router.poll_timeouts()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.router.next_deadline()
    }

    pub fn pending_calls(&self) -> Vec<CallId> {
        self.router.pending_calls()
    }

    /// Stops the transport; pending calls are rejected and later calls fail
    pub fn stop(&self) {
        self.router.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.router.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_request::CallStatus;
    use core::time::Duration;
    use rpc_envelope::{Envelope, MessageListener, WirePayload};
    use serde_json::json;

    #[derive(Default)]
    struct SinkTransport {
        sent: Mutex<Vec<WirePayload>>,
    }

    impl Transport for SinkTransport {
        fn send_message(&self, payload: WirePayload) {
            self.sent.lock().unwrap().push(payload);
        }

        fn listen(&self, _on_message: MessageListener) {}

        fn stop_transport(&self) {}
    }

    fn endpoint(config: RpcConfig) -> (Arc<SinkTransport>, RpcEndpoint) {
        let transport = Arc::new(SinkTransport::default());
        let endpoint = RpcEndpoint::new(transport.clone(), config.with_sender_id("me")).unwrap();
        (transport, endpoint)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let transport = Arc::new(SinkTransport::default());
        assert!(matches!(
            RpcEndpoint::new(transport, RpcConfig::new().with_channel("")),
            Err(ConfigError::EmptyChannel)
        ));
    }

    #[test]
    fn test_unregistered_remote_method_is_rejected_before_sending() {
        let (transport, endpoint) =
            endpoint(RpcConfig::new().with_required_remote_method_registration(true));
        endpoint.add_remote_method_names(["known"]);

        assert_eq!(
            endpoint.call("unknown", vec![], RequestOptions::new()).unwrap_err(),
            CallError::MethodNotRegistered("unknown".to_string())
        );
        assert!(transport.sent.lock().unwrap().is_empty());

        assert!(endpoint.call("known", vec![], RequestOptions::new()).is_ok());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_per_method_options_apply() {
        let (_, endpoint) = endpoint(RpcConfig::new());
        endpoint.set_default_request_options_for_method(
            "stream",
            RequestOptions::new().with_flight_receipt(true),
        );

        let handle = endpoint.call("stream", vec![], RequestOptions::new()).unwrap();
        assert!(matches!(handle, CallHandle::Receipt(_)));
        let handle = endpoint.call("other", vec![], RequestOptions::new()).unwrap();
        assert!(matches!(handle, CallHandle::Reply(_)));
    }

    #[test]
    fn test_global_timeout_sets_deadline() {
        let (_, endpoint) = endpoint(
            RpcConfig::new()
                .with_default_request_options(RequestOptions::new().with_timeout(Duration::from_secs(5))),
        );
        endpoint.call("slow", vec![], RequestOptions::new()).unwrap();
        assert!(endpoint.next_deadline().is_some());
    }

    #[test]
    fn test_call_override_sender_and_channel() {
        let (transport, endpoint) = endpoint(RpcConfig::new());
        endpoint
            .call(
                "ping",
                vec![],
                RequestOptions::new()
                    .with_sender_id(SenderId::new("proxy"))
                    .with_channel(ChannelName::new("side")),
            )
            .unwrap();
        let sent = transport.sent.lock().unwrap()[0].clone();
        match Envelope::from_payload(&sent).unwrap() {
            Envelope::Request(request) => {
                assert_eq!(request.sender_id.as_str(), "proxy");
                assert_eq!(request.channel.as_str(), "side");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_fails_pending_and_new_calls() {
        let (_, endpoint) = endpoint(RpcConfig::new());
        let handle = endpoint.call("ping", vec![], RequestOptions::new()).unwrap();
        endpoint.stop();
        assert_eq!(handle.status(), CallStatus::Rejected);
        assert!(endpoint.pending_calls().is_empty());
        assert_eq!(
            endpoint.call("ping", vec![], RequestOptions::new()).unwrap_err(),
            CallError::Stopped
        );
        assert!(endpoint.is_stopped());
    }
}
