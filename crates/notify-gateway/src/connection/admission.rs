//! Connection ceiling enforcement
//!
//! A slot is taken before authentication and released when the guard drops, so a
//! burst of handshakes can never push the live count past the configured maximum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counter of admitted connections
#[derive(Debug)]
pub struct ConnectionSlots {
    max: usize,
    in_use: AtomicUsize,
}

impl ConnectionSlots {
    #[must_use]
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max,
            in_use: AtomicUsize::new(0),
        })
    }

    /// Take a slot, or `None` when the ceiling is reached
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max).then_some(current + 1)
            })
            .ok()
            .map(|_| ConnectionSlot {
                slots: Arc::clone(self),
            })
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }
}

/// Guard that returns its slot on drop
#[derive(Debug)]
pub struct ConnectionSlot {
    slots: Arc<ConnectionSlots>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.slots.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
