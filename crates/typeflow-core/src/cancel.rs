//! Cooperative cancellation.
//!
//! The engine is single-writer, so this is not a concurrency primitive on
//! analysis state; it only lets another thread request that the current pass
//! stop at the next poll point (queue pop, statement boundary, propagation
//! traversal step).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
