//! Single-slot rendezvous between the delivery thread and the loop.
//!
//! The delivery thread deposits one raw event and blocks until the loop has
//! taken it, so at most one inbound event is ever pending.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::shutdown::Interrupt;

use super::topics::{ResponseKind, ShadowOperation};

/// Raw inbound event; decoding happens on the loop thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InboundEvent {
    Message {
        operation: ShadowOperation,
        response: ResponseKind,
        payload: Vec<u8>,
    },
    SessionLost,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Take {
    Event(InboundEvent),
    TimedOut,
    Closed,
}

#[derive(Default)]
struct Slot {
    event: Option<InboundEvent>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct Handoff {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl Handoff {
    /// Blocks while the slot is occupied. Returns `false` once closed.
    pub(crate) fn deposit(&self, event: InboundEvent) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if slot.closed {
                return false;
            }
            if slot.event.is_none() {
                slot.event = Some(event);
                self.changed.notify_all();
                return true;
            }
            slot = self
                .changed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes the pending event, waiting up to `timeout`.
    ///
    /// An event deposited before the handoff was closed is still returned.
    pub(crate) fn take(&self, timeout: Duration) -> Take {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(event) = slot.event.take() {
                self.changed.notify_all();
                return Take::Event(event);
            }
            if slot.closed {
                return Take::Closed;
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                return Take::TimedOut;
            }
            let (next, _) = self
                .changed
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            slot = next;
        }
    }

    pub(crate) fn close(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.closed = true;
        self.changed.notify_all();
    }
}

impl Interrupt for Handoff {
    fn interrupt(&self) {
        self.close();
    }
}
