//! In-memory transport pair
//!
//! Two connected ends. Whatever one end sends arrives at the other, either
//! straight away or parked in the receiver's inbox until the test releases it.

use crate::fault_injection::{FaultInjector, FaultPlan};
use rpc_envelope::{MessageListener, Transport, WirePayload};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type SharedListener = Arc<dyn Fn(WirePayload) + Send + Sync>;

/// When sent payloads reach the other end's listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Inside the sender's `send_message` call
    Immediate,
    /// When the receiving end calls `deliver_next` and friends
    Queued,
}

#[derive(Default)]
struct EndState {
    inbox: Mutex<VecDeque<WirePayload>>,
    listener: Mutex<Option<SharedListener>>,
    faults: Mutex<FaultInjector>,
    sent: Mutex<Vec<WirePayload>>,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EndState {
    fn listener(&self) -> Option<SharedListener> {
        lock(&self.listener).clone()
    }
}

/// One end of an in-memory link
pub struct MemoryTransport {
    local: Arc<EndState>,
    peer: Arc<EndState>,
    mode: DeliveryMode,
}

impl MemoryTransport {
    /// Creates two connected ends
    pub fn pair(mode: DeliveryMode) -> (MemoryTransport, MemoryTransport) {
        let a = Arc::new(EndState::default());
        let b = Arc::new(EndState::default());
        (
            MemoryTransport {
                local: a.clone(),
                peer: b.clone(),
                mode,
            },
            MemoryTransport {
                local: b,
                peer: a,
                mode,
            },
        )
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Installs faults applied to payloads arriving at this end
    pub fn set_fault_plan(&self, plan: FaultPlan) {
        *lock(&self.local.faults) = FaultInjector::new(plan);
    }

    /// Payloads dropped at this end by the fault plan
    pub fn dropped(&self) -> usize {
        lock(&self.local.faults).dropped()
    }

    /// Everything this end has sent, including payloads the peer dropped
    pub fn sent(&self) -> Vec<WirePayload> {
        lock(&self.local.sent).clone()
    }

    /// Payloads waiting in this end's inbox
    pub fn inbound_len(&self) -> usize {
        lock(&self.local.inbox).len()
    }

    /// Puts a raw payload in this end's inbox, as if the peer had sent it
    pub fn inject(&self, payload: WirePayload) {
        if self.local.stopped.load(Ordering::SeqCst) {
            return;
        }
        lock(&self.local.inbox).push_back(payload);
        if self.mode == DeliveryMode::Immediate {
            self.deliver_all();
        }
    }

    /// Removes queued payloads without delivering them
    pub fn take_inbox(&self) -> Vec<WirePayload> {
        lock(&self.local.inbox).drain(..).collect()
    }

    /// Delivers the oldest queued payload; false if nothing was delivered
    pub fn deliver_next(&self) -> bool {
        let Some(listener) = self.local.listener() else {
            return false;
        };
        let next = {
            let mut inbox = lock(&self.local.inbox);
            lock(&self.local.faults).apply_reordering(&mut inbox);
            inbox.pop_front()
        };
        match next {
            Some(payload) => {
                listener(payload);
                true
            }
            None => false,
        }
    }

    /// Delivers until the inbox is empty, including payloads queued meanwhile
    pub fn deliver_all(&self) -> usize {
        let mut delivered = 0;
        while self.deliver_next() {
            delivered += 1;
        }
        delivered
    }

    /// Delivers the currently queued payloads in the given order
    ///
    /// `order` holds indices into the inbox as it is now. Payloads not named
    /// stay queued.
    pub fn deliver_in_order(&self, order: &[usize]) -> usize {
        let Some(listener) = self.local.listener() else {
            return 0;
        };
        let batch: Vec<WirePayload> = lock(&self.local.inbox).drain(..).collect();
        let mut taken = vec![false; batch.len()];
        let mut selected = Vec::new();
        for &index in order {
            if index < batch.len() && !taken[index] {
                taken[index] = true;
                selected.push(batch[index].clone());
            }
        }
        {
            let mut inbox = lock(&self.local.inbox);
            for (index, payload) in batch.into_iter().enumerate().rev() {
                if !taken[index] {
                    inbox.push_front(payload);
                }
            }
        }
        let delivered = selected.len();
        for payload in selected {
            listener(payload);
        }
        delivered
    }

    pub fn is_stopped(&self) -> bool {
        self.local.stopped.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn send_message(&self, payload: WirePayload) {
        if self.local.stopped.load(Ordering::SeqCst) {
            return;
        }
        lock(&self.local.sent).push(payload.clone());

        if self.peer.stopped.load(Ordering::SeqCst) {
            return;
        }
        if lock(&self.peer.faults).should_drop(&payload) {
            return;
        }

        match (self.mode, self.peer.listener()) {
            (DeliveryMode::Immediate, Some(listener)) => listener(payload),
            _ => lock(&self.peer.inbox).push_back(payload),
        }
    }

    fn listen(&self, on_message: MessageListener) {
        if self.local.stopped.load(Ordering::SeqCst) {
            return;
        }
        *lock(&self.local.listener) = Some(Arc::from(on_message));
        if self.mode == DeliveryMode::Immediate {
            self.deliver_all();
        }
    }

    fn stop_transport(&self) {
        self.local.stopped.store(true, Ordering::SeqCst);
        lock(&self.local.listener).take();
        lock(&self.local.inbox).clear();
    }
}
