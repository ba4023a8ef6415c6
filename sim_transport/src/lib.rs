//! # Simulated Transport
//!
//! In-process collaborators for testing RPC endpoints.
//!
//! ## Purpose
//!
//! - Runs under `cargo test`
//! - Deterministic: time moves only when the test says so, payloads move
//!   only when the test releases them
//! - Inspectable: everything sent and everything queued can be read back
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! A real transport gives no ordering, delivery or timing guarantees. The
//! simulated one lets a test pick each of those explicitly: deliver in a
//! chosen permutation, drop a payload, or let a deadline pass without
//! sleeping.

pub mod clock;
pub mod fault_injection;
pub mod memory;

pub use clock::SimClock;
pub use fault_injection::{FaultInjector, FaultPlan, MessageFault};
pub use memory::{DeliveryMode, MemoryTransport};
