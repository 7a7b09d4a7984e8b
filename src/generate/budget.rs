// src/generate/budget.rs
//! Per-run article cap.
//!
//! A slot is reserved before a story is generated and either committed (the
//! article was published) or released (generation failed or publication was
//! refused). Reservation is a compare-and-swap, so concurrent tasks can never
//! push `reserved` past the cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct ArticleBudget {
    cap: usize,
    reserved: AtomicUsize,
}

impl ArticleBudget {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            reserved: AtomicUsize::new(0),
        }
    }

    /// Take a slot if one is free. The slot owns a handle on the budget so it
    /// can travel into a spawned task.
    pub fn try_reserve(self: &Arc<Self>) -> Option<BudgetSlot> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.cap).then_some(n + 1)
            })
            .ok()
            .map(|_| BudgetSlot {
                budget: Arc::clone(self),
                committed: false,
            })
    }

    /// Slots currently held or committed.
    pub fn used(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.used())
    }
}

/// A reserved slot. Dropping it without [`commit`](BudgetSlot::commit) gives
/// the slot back.
#[derive(Debug)]
pub struct BudgetSlot {
    budget: Arc<ArticleBudget>,
    committed: bool,
}

impl BudgetSlot {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for BudgetSlot {
    fn drop(&mut self) {
        if !self.committed {
            self.budget.reserved.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
