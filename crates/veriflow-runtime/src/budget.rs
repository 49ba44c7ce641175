//! Call budget for the model gateway.
//!
//! A simple rate-limit budget: the gateway refuses to go on the wire once
//! the budget is spent. Callers fall back the same way they do for any
//! other gateway failure.

use std::sync::atomic::{AtomicU32, Ordering};

/// Counted call budget. Cheap to share; all operations are atomic.
pub struct CallBudget {
    max_calls: u32,
    used: AtomicU32,
}

impl CallBudget {
    /// Create a budget allowing `max_calls` calls.
    pub fn new(max_calls: u32) -> Self {
        Self {
            max_calls,
            used: AtomicU32::new(0),
        }
    }

    /// Claim one call slot. Returns false once the budget is spent; a
    /// refused claim consumes nothing.
    pub fn try_acquire(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.max_calls).then_some(used + 1)
            })
            .is_ok()
    }

    /// Calls remaining.
    pub fn remaining(&self) -> u32 {
        self.max_calls.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    /// Calls made so far.
    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    /// Reset the budget (e.g. on a billing-window rollover).
    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}
