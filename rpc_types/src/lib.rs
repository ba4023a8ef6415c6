//! # RPC Types
//!
//! This crate defines the fundamental types shared by every layer of the RPC
//! stack.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: Identifiers are typed and cannot be confused.
//! - **Plain data**: Everything here serializes, because it crosses a process boundary.
//! - **Injectable time**: Nothing reads the wall clock directly; it asks a [`Clock`].
//!
//! ## Key Types
//!
//! - [`CallId`]: Unique identifier of one outbound call
//! - [`SenderId`]: Identity stamped on every message an endpoint sends
//! - [`ChannelName`]: Namespace partitioning RPC instances on one transport
//! - [`Instant`] / [`Clock`]: Timestamps and the source of "now"

pub mod ids;
pub mod time;

pub use ids::{CallId, ChannelName, SenderId, DEFAULT_CHANNEL};
pub use time::{Clock, Instant, SystemClock};
