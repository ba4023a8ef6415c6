//! # RPC Core
//!
//! Request/response correlation over an arbitrary message transport.
//!
//! ## Philosophy
//!
//! - Correlation is by call id only, never by arrival order
//! - Every call settles exactly once: response, timeout, cancel or stop
//! - Failures from the peer or the environment arrive through the same
//!   settlement path as results; bad input never panics the router
//! - Time is injected through a [`Clock`](rpc_types::Clock), so timeouts are
//!   testable without sleeping
//!
//! ## Example
//!
//! ```ignore
//! let endpoint = RpcEndpoint::new(transport, RpcConfig::new().with_channel("editor"))?;
//! endpoint.add_request_handler("add", |args| {
//!     let (a, b): (i64, i64) = args.parse()?;
//!     Ok(json!(a + b))
//! });
//! let sum: i64 = endpoint.call("add", vec![json!(2), json!(3)], RequestOptions::new())?.wait_as()?;
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod flight_receipt;
pub mod options;
pub mod registry;
pub mod remote_request;
pub mod responder;
pub mod router;
mod sync;
mod timer;

pub use config::{Preparse, PreparseHook, RpcConfig, RpcSettings};
pub use endpoint::RpcEndpoint;
pub use error::{CallError, ConfigError};
pub use flight_receipt::{CallHandle, FlightReceipt, PendingReply};
pub use options::{EndpointIdentity, RequestOptions, ResolvedRequestOptions, TimeoutPolicy};
pub use registry::{Args, Delegate, DelegateFilter, Handler, HandlerFault, HandlerRegistry};
pub use remote_request::{CallSlot, CallStatus, RemoteRequest};
pub use responder::{Responder, ResponseSink};
pub use router::{Router, CANCEL_METHOD};
