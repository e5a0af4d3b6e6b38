//! Atomic countdown bookkeeping
//!
//! A `Counter` tracks how many completion signals a blocking callback expects
//! and how many have arrived so far, plus a one-way abort flag. All operations
//! are lock-free and safe to call from any partition thread.

use crate::error::CoordinationError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sentinel meaning "no target has been set"
const UNSET: usize = 0;

/// Thread-safe target/current counter with an abort flag
#[derive(Debug, Default)]
pub struct Counter {
    target: AtomicUsize,
    current: AtomicUsize,
    aborted: AtomicBool,
}

impl Counter {
    /// Create a blank counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected number of completions
    ///
    /// Fails if the counter already has a target and has not been reset, or if
    /// `target` is zero.
    pub fn init(&self, target: usize) -> Result<(), CoordinationError> {
        if target == UNSET {
            return Err(CoordinationError::InvalidTarget { target });
        }
        self.target
            .compare_exchange(UNSET, target, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|existing| CoordinationError::CounterAlreadyInitialized { target: existing })
    }

    /// Record one completion and return the new current value
    pub fn increment(&self) -> usize {
        self.add(1)
    }

    /// Record `delta` completions and return the new current value
    pub fn add(&self, delta: usize) -> usize {
        self.current.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Flag the counter as aborted. Returns true for the call that set the flag.
    pub fn mark_aborted(&self) -> bool {
        !self.aborted.swap(true, Ordering::AcqRel)
    }

    /// True iff the target is reached and the counter was never aborted
    pub fn is_satisfied(&self) -> bool {
        let target = self.target();
        target != UNSET && self.current() == target && !self.is_aborted()
    }

    pub fn is_initialized(&self) -> bool {
        self.target() != UNSET
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn target(&self) -> usize {
        self.target.load(Ordering::Acquire)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Completions still outstanding before the target is reached
    pub fn remaining(&self) -> usize {
        self.target().saturating_sub(self.current())
    }

    /// Restore the blank state
    ///
    /// Must only be called once the owning callback has finalized; never
    /// concurrently with `increment`.
    pub fn reset(&self) {
        self.current.store(0, Ordering::Release);
        self.aborted.store(false, Ordering::Release);
        self.target.store(UNSET, Ordering::Release);
    }
}
