//! Resilience Test Utilities
//!
//! Shared setup for the integration tests in `tests/`.
//!
//! ## Test Philosophy
//!
//! - **Correlation under disorder**: results match calls no matter how the
//!   transport orders, delays or drops payloads
//! - **Exactly-once settlement**: one outcome per call, late events ignored
//! - **Deterministic failures**: drops and reorders come from a `FaultPlan`,
//!   time comes from a `SimClock`

use rpc_core::{RpcConfig, RpcEndpoint};
use rpc_logger::MemoryLogSink;
use rpc_types::Instant;
use sim_transport::{DeliveryMode, MemoryTransport, SimClock};
use std::sync::Arc;

pub const TEST_CHANNEL: &str = "resilience";

/// Two endpoints joined by an in-memory link, sharing one simulated clock
pub struct LinkedPair {
    pub left: RpcEndpoint,
    pub right: RpcEndpoint,
    pub left_transport: Arc<MemoryTransport>,
    pub right_transport: Arc<MemoryTransport>,
    pub left_logs: Arc<MemoryLogSink>,
    pub right_logs: Arc<MemoryLogSink>,
    pub clock: SimClock,
}

impl LinkedPair {
    /// Delivers queued payloads on both ends until the link is quiet
    pub fn pump(&self) -> usize {
        let mut total = 0;
        loop {
            let delivered = self.right_transport.deliver_all() + self.left_transport.deliver_all();
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
    }
}

/// Bootstrap helper for tests
///
/// Endpoints are named `left` and `right` on channel [`TEST_CHANNEL`].
pub fn test_bootstrap(mode: DeliveryMode) -> LinkedPair {
    test_bootstrap_with(mode, |config| config, |config| config)
}

/// Like [`test_bootstrap`], with a hook to adjust each side's configuration
pub fn test_bootstrap_with(
    mode: DeliveryMode,
    configure_left: impl FnOnce(RpcConfig) -> RpcConfig,
    configure_right: impl FnOnce(RpcConfig) -> RpcConfig,
) -> LinkedPair {
    let clock = SimClock::starting_at(Instant::from_millis(1_000_000));
    let (left_end, right_end) = MemoryTransport::pair(mode);
    let left_transport = Arc::new(left_end);
    let right_transport = Arc::new(right_end);
    let left_logs = Arc::new(MemoryLogSink::new());
    let right_logs = Arc::new(MemoryLogSink::new());

    let base = |name: &str, logs: &Arc<MemoryLogSink>| {
        RpcConfig::new()
            .with_channel(TEST_CHANNEL)
            .with_sender_id(name)
            .with_clock(Arc::new(clock.clone()))
            .with_logger(logs.clone())
    };

    let left = RpcEndpoint::new(left_transport.clone(), configure_left(base("left", &left_logs)))
        .unwrap_or_else(|err| panic!("left endpoint config: {}", err));
    let right = RpcEndpoint::new(
        right_transport.clone(),
        configure_right(base("right", &right_logs)),
    )
    .unwrap_or_else(|err| panic!("right endpoint config: {}", err));

    LinkedPair {
        left,
        right,
        left_transport,
        right_transport,
        left_logs,
        right_logs,
        clock,
    }
}

/// One endpoint whose peer never answers
pub fn lone_endpoint(configure: impl FnOnce(RpcConfig) -> RpcConfig) -> (RpcEndpoint, Arc<MemoryTransport>, SimClock) {
    let clock = SimClock::starting_at(Instant::from_millis(1_000_000));
    let (local, remote) = MemoryTransport::pair(DeliveryMode::Queued);
    let config = configure(
        RpcConfig::new()
            .with_channel(TEST_CHANNEL)
            .with_sender_id("lonely")
            .with_clock(Arc::new(clock.clone())),
    );
    let endpoint = RpcEndpoint::new(Arc::new(local), config)
        .unwrap_or_else(|err| panic!("endpoint config: {}", err));
    (endpoint, Arc::new(remote), clock)
}
