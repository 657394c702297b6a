//! Generation-versioned cache cells.
//!
//! Each cache the engine owns is a [`GenCell`]: a value slot stamped with the
//! generation it was computed under, next to a monotonically increasing
//! generation counter. Invalidation is a counter bump; a reader refuses any
//! slot whose stamp is behind the counter. This makes the invalidation race
//! benign: a computation that straddles an invalidation may still return its
//! result to its own caller, but the cell never serves it afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// A lazily populated, invalidation-aware cache slot.
///
/// Readers never block writers beyond the inner lock; concurrent misses may
/// redundantly compute, which is acceptable because cached values are pure
/// functions of the current configuration.
#[derive(Debug)]
pub struct GenCell<T: Clone> {
    generation: AtomicU64,
    slot: RwLock<Option<(u64, T)>>,
}

impl<T: Clone> Default for GenCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> GenCell<T> {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            slot: RwLock::new(None),
        }
    }

    /// The current generation. Take it before computing a value and pass it
    /// to [`fill_at`](Self::fill_at) so a fill that straddled an invalidation
    /// is recorded as already stale.
    pub fn begin(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The cached value, if one was filled at the current generation.
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        match &*slot {
            Some((stamp, value)) if *stamp == self.generation.load(Ordering::Acquire) => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Record a value computed at generation `stamp`.
    ///
    /// A stale stamp is still stored but will never be served; a concurrent
    /// fresher fill wins because `get` compares stamps, not slot recency.
    pub fn fill_at(&self, stamp: u64, value: T) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        let keep_existing = matches!(&*slot, Some((existing, _)) if *existing > stamp);
        if !keep_existing {
            *slot = Some((stamp, value));
        }
    }

    /// Drop the cached value by bumping the generation. Last writer wins;
    /// in-flight readers complete with possibly-stale data.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether a value is currently cached.
    pub fn is_filled(&self) -> bool {
        self.get().is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================
