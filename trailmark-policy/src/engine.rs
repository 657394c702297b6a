//! The policy engine façade.
//!
//! Owns the four cache cells, resolves the active strategy, answers the two
//! policy questions, serializes mutations, and reacts to configuration
//! change notifications. Every cache-miss computation runs inside a
//! [`FlushScope`] so a configuration read can never re-enter the engine
//! through the store's auto-flush side channel.

use crate::cache::GenCell;
use crate::closure;
use crate::config::{ChangeEvent, ConfigStore, FlushScope};
use crate::exceptions;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use trailmark_core::{
    config_keys, AuditingStrategy, ConfigError, PolicyError, TrailmarkResult, TypeKey,
};
use trailmark_schema::{SchemaIntrospector, TypeLoader};

/// Audit policy engine.
///
/// One instance owns all policy caches; hosts share it behind an `Arc`.
/// Read-only queries take no lock beyond the cache cells' own. The two
/// mutating operations serialize on an internal mutex because they
/// read-modify-write the exception set and then persist it.
pub struct PolicyEngine<S, C>
where
    S: SchemaIntrospector + TypeLoader,
    C: ConfigStore,
{
    schema: Arc<S>,
    config: Arc<C>,
    strategy_cache: GenCell<AuditingStrategy>,
    exceptions_cache: GenCell<BTreeSet<TypeKey>>,
    implicit_cache: GenCell<BTreeSet<TypeKey>>,
    store_last_state_cache: GenCell<bool>,
    mutation_lock: Mutex<()>,
}

impl<S, C> PolicyEngine<S, C>
where
    S: SchemaIntrospector + TypeLoader,
    C: ConfigStore,
{
    pub fn new(schema: Arc<S>, config: Arc<C>) -> Self {
        Self {
            schema,
            config,
            strategy_cache: GenCell::new(),
            exceptions_cache: GenCell::new(),
            implicit_cache: GenCell::new(),
            store_last_state_cache: GenCell::new(),
            mutation_lock: Mutex::new(()),
        }
    }

    /// The schema this engine answers for.
    pub fn schema(&self) -> &S {
        &self.schema
    }

    /// The active auditing strategy.
    ///
    /// Read lazily from configuration and cached. An absent or blank value
    /// resolves to [`AuditingStrategy::None`] on every call WITHOUT caching,
    /// so the first concrete value set later is observed immediately. A
    /// present but malformed value fails the calling query with
    /// [`ConfigError::MalformedValue`] and is not cached either.
    pub fn strategy(&self) -> TrailmarkResult<AuditingStrategy> {
        if let Some(strategy) = self.strategy_cache.get() {
            return Ok(strategy);
        }
        let stamp = self.strategy_cache.begin();
        let _guard = FlushScope::new(self.config.as_ref());
        match self.config.get(config_keys::AUDITING_STRATEGY) {
            None => Ok(AuditingStrategy::None),
            Some(raw) if raw.trim().is_empty() => Ok(AuditingStrategy::None),
            Some(raw) => {
                let strategy = AuditingStrategy::from_config_str(&raw).map_err(|err| {
                    ConfigError::MalformedValue {
                        key: config_keys::AUDITING_STRATEGY.to_string(),
                        value: raw.clone(),
                        reason: err.to_string(),
                    }
                })?;
                self.strategy_cache.fill_at(stamp, strategy);
                Ok(strategy)
            }
        }
    }

    /// Whether mutations to instances of `ty` must be audited.
    ///
    /// Always false for types without mapping metadata.
    pub fn is_audited(&self, ty: &TypeKey) -> TrailmarkResult<bool> {
        if !self.schema.is_mapped(ty) {
            return Ok(false);
        }
        match self.strategy()? {
            AuditingStrategy::None => Ok(false),
            AuditingStrategy::All => Ok(true),
            AuditingStrategy::NoneExcept => Ok(self.exceptions().contains(ty)),
            AuditingStrategy::AllExcept => Ok(!self.exceptions().contains(ty)),
        }
    }

    /// Whether `ty` is audited only because an audited type owns it.
    pub fn is_implicitly_audited(&self, ty: &TypeKey) -> TrailmarkResult<bool> {
        if !self.schema.is_mapped(ty) {
            return Ok(false);
        }
        if self.strategy()? == AuditingStrategy::None {
            return Ok(false);
        }
        Ok(self.implicitly_audited_types()?.contains(ty))
    }

    /// The current exception set, loaded lazily from configuration.
    pub fn exceptions(&self) -> BTreeSet<TypeKey> {
        if let Some(set) = self.exceptions_cache.get() {
            return set;
        }
        let stamp = self.exceptions_cache.begin();
        let _guard = FlushScope::new(self.config.as_ref());
        let set = exceptions::load(self.schema.as_ref(), self.config.as_ref());
        self.exceptions_cache.fill_at(stamp, set.clone());
        set
    }

    /// The derived implicitly-audited set, computed once per cache
    /// generation.
    pub fn implicitly_audited_types(&self) -> TrailmarkResult<BTreeSet<TypeKey>> {
        if let Some(set) = self.implicit_cache.get() {
            return Ok(set);
        }
        let strategy = self.strategy()?;
        let exceptions = self.exceptions();
        let stamp = self.implicit_cache.begin();
        let _guard = FlushScope::new(self.config.as_ref());
        let set = closure::implicitly_audited(self.schema.as_ref(), strategy, &exceptions);
        self.implicit_cache.fill_at(stamp, set.clone());
        Ok(set)
    }

    /// Start auditing the given types.
    ///
    /// Only meaningful under an exception-based strategy; fails with
    /// [`PolicyError::WrongStrategy`] otherwise, with no state change.
    pub fn start_auditing(&self, types: &BTreeSet<TypeKey>) -> TrailmarkResult<()> {
        self.update_exceptions(types, true)
    }

    /// Stop auditing the given types (and, on removal, their concrete
    /// subclasses).
    pub fn stop_auditing(&self, types: &BTreeSet<TypeKey>) -> TrailmarkResult<()> {
        self.update_exceptions(types, false)
    }

    fn update_exceptions(
        &self,
        types: &BTreeSet<TypeKey>,
        start_auditing: bool,
    ) -> TrailmarkResult<()> {
        let strategy = self.strategy()?;
        if !strategy.is_exception_based() {
            let operation = if start_auditing {
                "start auditing"
            } else {
                "stop auditing"
            };
            return Err(PolicyError::WrongStrategy {
                strategy,
                operation: operation.to_string(),
            }
            .into());
        }

        let _mutation = self.mutation_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut set = self.exceptions();
        exceptions::apply(&mut set, types, start_auditing, strategy, self.schema.as_ref());
        let encoded = exceptions::encode(&set);
        match self.config.set(config_keys::AUDITED_EXCEPTIONS, &encoded) {
            Ok(()) => {
                // Reload on next read so newly added supertypes pick up their
                // concrete subclasses through the load-time expansion.
                self.exceptions_cache.invalidate();
                self.implicit_cache.invalidate();
                Ok(())
            }
            Err(err) => {
                // The in-memory mutation must never be presented as durable:
                // force the next read to rebuild from the persisted state.
                self.exceptions_cache.invalidate();
                self.implicit_cache.invalidate();
                Err(err.into())
            }
        }
    }

    /// Whether the last state of deleted items should be stored.
    ///
    /// Independent boolean cache; absent or unparseable values resolve to
    /// false and ARE cached (its own change notification invalidates it).
    pub fn store_last_state_of_deleted_items(&self) -> bool {
        if let Some(value) = self.store_last_state_cache.get() {
            return value;
        }
        let stamp = self.store_last_state_cache.begin();
        let _guard = FlushScope::new(self.config.as_ref());
        let value = self
            .config
            .get(config_keys::STORE_LAST_STATE_OF_DELETED_ITEMS)
            .map(|raw| raw.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        self.store_last_state_cache.fill_at(stamp, value);
        value
    }

    /// React to a configuration change notification.
    ///
    /// A strategy change tears down all policy caches and resets the
    /// persisted exception list - a new strategy invalidates the meaning of
    /// any existing list. An exception-list change tears down the exception
    /// and implicit caches only. The store-last-state flag has its own
    /// dedicated cache and trigger. Unrelated keys invalidate nothing.
    /// Deletions behave like changes.
    pub fn config_changed(&self, event: ChangeEvent<'_>) {
        match event.key {
            config_keys::AUDITING_STRATEGY => {
                tracing::debug!("auditing strategy changed; dropping policy caches");
                self.strategy_cache.invalidate();
                self.exceptions_cache.invalidate();
                self.implicit_cache.invalidate();
                if let Err(err) = self.config.set(config_keys::AUDITED_EXCEPTIONS, "") {
                    tracing::warn!(
                        error = %err,
                        "failed to reset the exception list after a strategy change"
                    );
                }
            }
            config_keys::AUDITED_EXCEPTIONS => {
                tracing::debug!("exception list changed; dropping derived caches");
                self.exceptions_cache.invalidate();
                self.implicit_cache.invalidate();
            }
            config_keys::STORE_LAST_STATE_OF_DELETED_ITEMS => {
                self.store_last_state_cache.invalidate();
            }
            _ => {}
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
