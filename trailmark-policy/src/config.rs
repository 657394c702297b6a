//! Configuration store boundary and the flush-suspension guard.
//!
//! The engine reads its strategy and exception list from a key-value
//! configuration store. In the host stack a configuration read can trigger a
//! pending auto-flush, and the flush interceptor asks the engine the very
//! question it is in the middle of answering. [`FlushScope`] suspends that
//! side channel for the duration of a cache-miss computation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;
use trailmark_core::ConfigError;

/// Whether the store may deliver auto-flush / change-notification side
/// effects while being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Normal operation: reads may trigger pending flushes and notification
    /// delivery.
    Automatic,
    /// Side effects are held back until the mode is restored.
    Suspended,
}

/// A configuration change notification, as delivered by the store's host.
///
/// `new_value` of `None` means the key was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent<'a> {
    pub key: &'a str,
    pub new_value: Option<&'a str>,
}

/// Key-value configuration store.
///
/// Reads and writes are synchronous and uncancellable; callers that need
/// bounded latency wrap calls externally.
pub trait ConfigStore: Send + Sync {
    /// Current value for `key`, or `None` when absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Persist a value. Fails with [`ConfigError::PersistFailed`] when the
    /// underlying store rejects the write.
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// The store's current flush mode.
    fn flush_mode(&self) -> FlushMode;

    /// Switch the flush mode, returning the previous one.
    fn set_flush_mode(&self, mode: FlushMode) -> FlushMode;
}

/// Scoped suspension of the store's auto-flush behavior.
///
/// Saves the store's flush mode on construction, sets `Suspended`, and
/// restores the saved mode on drop - on every exit path, including early
/// returns and panics. Cache-miss computations in the engine run inside one
/// of these.
pub struct FlushScope<'a, C: ConfigStore + ?Sized> {
    store: &'a C,
    previous: FlushMode,
}

impl<'a, C: ConfigStore + ?Sized> FlushScope<'a, C> {
    pub fn new(store: &'a C) -> Self {
        let previous = store.set_flush_mode(FlushMode::Suspended);
        Self { store, previous }
    }
}

impl<C: ConfigStore + ?Sized> Drop for FlushScope<'_, C> {
    fn drop(&mut self) {
        self.store.set_flush_mode(self.previous);
    }
}

// ============================================================================
// IN-MEMORY CONFIG STORE
// ============================================================================

/// In-memory configuration store for tests and embedded setups.
///
/// Counts reads per key so tests can assert that a cache fill hits the store
/// at most once, and can be told to fail the next write so persistence
/// failure paths are exercisable.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
    flush_suspended: AtomicBool,
    reads: RwLock<HashMap<String, u64>>,
    writes: AtomicU64,
    fail_next_set: AtomicU8,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without counting it as a write.
    pub fn seed(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }

    /// Remove a value without counting it as a write.
    pub fn unseed(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    /// Number of `get` calls observed for `key`.
    pub fn reads_of(&self, key: &str) -> u64 {
        self.reads
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Number of successful `set` calls observed.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make the next `n` calls to `set` fail with `PersistFailed`.
    pub fn fail_next_sets(&self, n: u8) {
        self.fail_next_set.store(n, Ordering::Relaxed);
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        *self
            .reads
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.to_string())
            .or_insert(0) += 1;
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let pending = self.fail_next_set.load(Ordering::Relaxed);
        if pending > 0 {
            self.fail_next_set.store(pending - 1, Ordering::Relaxed);
            return Err(ConfigError::PersistFailed {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush_mode(&self) -> FlushMode {
        if self.flush_suspended.load(Ordering::Acquire) {
            FlushMode::Suspended
        } else {
            FlushMode::Automatic
        }
    }

    fn set_flush_mode(&self, mode: FlushMode) -> FlushMode {
        let previous = self
            .flush_suspended
            .swap(mode == FlushMode::Suspended, Ordering::AcqRel);
        if previous {
            FlushMode::Suspended
        } else {
            FlushMode::Automatic
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
