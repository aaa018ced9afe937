//! Write-back gate for background computations.
//!
//! Every request takes a new [`Generation`]. A finished computation may only
//! store its result while its generation is still the latest one, so a slow
//! stale run can never overwrite the result of a newer request.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

pub struct GenerationGate<T> {
    current: AtomicU64,
    slot: Mutex<Option<(Generation, T)>>,
}

impl<T> GenerationGate<T> {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            slot: Mutex::new(None),
        }
    }

    /// Starts a new request. Any result not yet taken is discarded.
    pub fn begin(&self) -> Generation {
        let mut slot = self.slot.lock();
        *slot = None;
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }

    /// Stores `value` if `generation` is still the latest request.
    /// Returns whether the value was kept.
    pub fn publish(&self, generation: Generation, value: T) -> bool {
        let mut slot = self.slot.lock();
        if !self.is_current(generation) {
            debug!(
                stale = generation.0,
                current = self.current().0,
                "Dropping stale result"
            );
            return false;
        }
        *slot = Some((generation, value));
        true
    }

    /// Hands out the latest published result, leaving the slot empty.
    pub fn take(&self) -> Option<(Generation, T)> {
        self.slot.lock().take()
    }
}

impl<T> Default for GenerationGate<T> {
    fn default() -> Self {
        Self::new()
    }
}
