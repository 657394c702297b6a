//! Exception-set loading, mutation, and serialization.
//!
//! The exception set is semantically overloaded: under `NoneExcept` it lists
//! the only audited types, under `AllExcept` the types excluded from audit.
//! It is persisted as a comma-joined list of fully-qualified type names and
//! reconciled with the store on every mutating operation.

use crate::config::ConfigStore;
use std::collections::BTreeSet;
use trailmark_core::{config_keys, AuditingStrategy, TypeKey};
use trailmark_schema::{concrete_subclasses, SchemaIntrospector, TypeLoader};

/// Load the exception set from configuration.
///
/// The persisted value is comma-split with per-entry trimming; each name is
/// resolved through the type loader and expanded with its concrete
/// subclasses. An entry that fails to load is logged and skipped - the rest
/// of the list still loads. An absent or blank value yields an empty set.
pub fn load<S, C>(schema: &S, config: &C) -> BTreeSet<TypeKey>
where
    S: SchemaIntrospector + TypeLoader + ?Sized,
    C: ConfigStore + ?Sized,
{
    let mut set = BTreeSet::new();
    let Some(raw) = config.get(config_keys::AUDITED_EXCEPTIONS) else {
        return set;
    };
    for name in raw.split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        match schema.load_by_name(name) {
            Ok(key) => {
                for subclass in concrete_subclasses(schema, &key) {
                    set.insert(subclass);
                }
                set.insert(key);
            }
            Err(err) => {
                tracing::warn!(
                    type_name = name,
                    error = %err,
                    "skipping exception-list entry that failed to load"
                );
            }
        }
    }
    set
}

/// Serialize the set as a sorted, comma-joined list of fully-qualified
/// names - the persisted configuration representation.
pub fn encode(set: &BTreeSet<TypeKey>) -> String {
    let names: Vec<&str> = set.iter().map(TypeKey::name).collect();
    names.join(",")
}

/// Apply a start/stop mutation to the in-memory set.
///
/// Under `NoneExcept`, starting audit inserts each type and stopping removes
/// it together with all of its concrete subclasses. Under `AllExcept` the
/// semantics invert: starting audit removes the type (and subclasses) from
/// the exception list, stopping adds it. Flat strategies must be rejected by
/// the caller before getting here.
pub fn apply<S>(
    set: &mut BTreeSet<TypeKey>,
    types: &BTreeSet<TypeKey>,
    start_auditing: bool,
    strategy: AuditingStrategy,
    schema: &S,
) where
    S: SchemaIntrospector + ?Sized,
{
    let inserting = if strategy == AuditingStrategy::NoneExcept {
        start_auditing
    } else {
        !start_auditing
    };
    for ty in types {
        if inserting {
            set.insert(ty.clone());
        } else {
            set.remove(ty);
            for subclass in concrete_subclasses(schema, ty) {
                set.remove(&subclass);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// encode/parse round trip: splitting the encoded value on commas and
        /// trimming reproduces the set's names exactly.
        #[test]
        fn prop_encode_round_trips_through_split(
            names in proptest::collection::btree_set("[a-zA-Z][a-zA-Z0-9.]{0,18}", 0..12),
        ) {
            let set: BTreeSet<TypeKey> =
                names.iter().map(|n| TypeKey::new(n.clone())).collect();
            let encoded = encode(&set);
            let reparsed: BTreeSet<TypeKey> = encoded
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(TypeKey::new)
                .collect();
            prop_assert_eq!(reparsed, set);
        }

        /// encode output is sorted regardless of insertion order.
        #[test]
        fn prop_encode_is_sorted(
            names in proptest::collection::vec("[a-zA-Z][a-zA-Z0-9.]{0,18}", 0..12),
        ) {
            let set: BTreeSet<TypeKey> =
                names.iter().map(|n| TypeKey::new(n.clone())).collect();
            let encoded = encode(&set);
            let parts: Vec<&str> = encoded
                .split(',')
                .filter(|s| !s.is_empty())
                .collect();
            let mut sorted = parts.clone();
            sorted.sort();
            prop_assert_eq!(parts, sorted);
        }
    }
}
