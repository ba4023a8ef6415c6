//! Deterministic fault injection for in-memory delivery
//!
//! A [`FaultPlan`] lists what should go wrong; a [`FaultInjector`] tracks
//! which faults have already fired. Nothing here is random.
//!
//! ## Example
//!
//! ```
//! use sim_transport::fault_injection::{FaultPlan, MessageFault};
//!
//! let plan = FaultPlan::new()
//!     .with_message_fault(MessageFault::DropNext { count: 2 })
//!     .with_message_fault(MessageFault::DropMethod { method: "ping".to_string() });
//! assert_eq!(plan.message_faults().len(), 2);
//! ```

use rpc_envelope::WirePayload;
use std::collections::VecDeque;

/// A fault to inject into payload delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFault {
    /// Drop the next N payloads
    DropNext { count: usize },

    /// Drop every request payload for this method
    DropMethod { method: String },

    /// Drop every response payload (leaves requests alone)
    DropResponses,

    /// Swap the queued payload at `index` with the one at `index + offset`, once
    ReorderWindow { index: usize, offset: usize },
}

/// All faults to inject on one receiving end
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    message_faults: Vec<MessageFault>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_fault(mut self, fault: MessageFault) -> Self {
        self.message_faults.push(fault);
        self
    }

    pub fn message_faults(&self) -> &[MessageFault] {
        &self.message_faults
    }

    pub fn is_empty(&self) -> bool {
        self.message_faults.is_empty()
    }
}

/// Applies a [`FaultPlan`] to payloads as they arrive
#[derive(Debug, Default)]
pub struct FaultInjector {
    plan: FaultPlan,
    drop_next_count: usize,
    reorders_applied: Vec<bool>,
    dropped: usize,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        let drop_next_count = plan
            .message_faults()
            .iter()
            .map(|fault| match fault {
                MessageFault::DropNext { count } => *count,
                _ => 0,
            })
            .sum();
        let reorders_applied = vec![false; plan.message_faults().len()];
        Self {
            plan,
            drop_next_count,
            reorders_applied,
            dropped: 0,
        }
    }

    /// Decides whether an arriving payload is lost
    pub fn should_drop(&mut self, payload: &WirePayload) -> bool {
        let drop = if self.drop_next_count > 0 {
            self.drop_next_count -= 1;
            true
        } else {
            self.plan.message_faults().iter().any(|fault| match fault {
                MessageFault::DropMethod { method } => {
                    payload.get("methodName").and_then(|m| m.as_str()) == Some(method.as_str())
                }
                MessageFault::DropResponses => {
                    payload.get("result").is_some() || payload.get("error").is_some()
                }
                _ => false,
            })
        };
        if drop {
            self.dropped += 1;
        }
        drop
    }

    /// Applies pending reorder faults whose window fits in the queue
    pub fn apply_reordering(&mut self, messages: &mut VecDeque<WirePayload>) {
        for (position, fault) in self.plan.message_faults().iter().enumerate() {
            if let MessageFault::ReorderWindow { index, offset } = fault {
                if !self.reorders_applied[position] && index + offset < messages.len() {
                    messages.swap(*index, index + offset);
                    self.reorders_applied[position] = true;
                }
            }
        }
    }

    /// Number of payloads dropped so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
