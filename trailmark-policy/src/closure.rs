//! Association-closure computation.
//!
//! When a type is audited, the types it owns through one-to-one and
//! one-to-many associations must be tracked too, or the trail has holes in
//! it. This module computes that transitive closure and derives the
//! implicitly-audited set for the two exception-based strategies.

use std::collections::BTreeSet;
use trailmark_core::{AuditingStrategy, TypeKey};
use trailmark_schema::{PropertyKind, SchemaIntrospector};

/// Transitive set of types reachable from `seeds` via owned associations.
///
/// Every declared property of every seed is inspected. One-to-one targets
/// and one-to-many collection elements are followed; many-to-many
/// collections never propagate (the far end is shared, not owned), and
/// targets without mapping metadata are skipped silently. Each newly found
/// type is expanded the same way into the shared result set, so cyclic
/// schemas terminate: a type already present is never re-expanded.
///
/// The many-to-many exclusion is per-path, not global - a type skipped along
/// a many-to-many edge is still included when some other edge reaches it
/// through owned ownership.
pub fn association_closure<S>(schema: &S, seeds: &BTreeSet<TypeKey>) -> BTreeSet<TypeKey>
where
    S: SchemaIntrospector + ?Sized,
{
    let mut found = BTreeSet::new();
    for seed in seeds {
        expand(schema, seed, &mut found);
    }
    found
}

fn expand<S>(schema: &S, ty: &TypeKey, found: &mut BTreeSet<TypeKey>)
where
    S: SchemaIntrospector + ?Sized,
{
    for property in schema.properties_of(ty) {
        let target = match property.kind {
            PropertyKind::Scalar => continue,
            PropertyKind::OneToOne { target } => target,
            PropertyKind::Collection {
                element,
                many_to_many,
            } => {
                if many_to_many {
                    continue;
                }
                element
            }
        };
        if !schema.is_mapped(&target) {
            // A mapping anomaly, not an error: the policy only cares about
            // persistent-domain associations.
            continue;
        }
        if found.insert(target.clone()) {
            expand(schema, &target, found);
        }
    }
}

/// Types audited only because of their association to an audited type.
///
/// Under `NoneExcept` the seeds are the explicitly audited types (the
/// exception set); closure members not already explicitly audited become
/// implicit. Under `AllExcept` with a non-empty exception set the seeds are
/// every mapped type not excepted, and closure members that ARE excepted
/// become implicit - an excluded child stays tracked while its owning parent
/// is audited. Under `None` and `All` implicit audit is meaningless and the
/// set is empty.
pub fn implicitly_audited<S>(
    schema: &S,
    strategy: AuditingStrategy,
    exceptions: &BTreeSet<TypeKey>,
) -> BTreeSet<TypeKey>
where
    S: SchemaIntrospector + ?Sized,
{
    match strategy {
        AuditingStrategy::NoneExcept => {
            let closure = association_closure(schema, exceptions);
            closure.difference(exceptions).cloned().collect()
        }
        AuditingStrategy::AllExcept if !exceptions.is_empty() => {
            let seeds: BTreeSet<TypeKey> = schema
                .mapped_types()
                .into_iter()
                .filter(|ty| !exceptions.contains(ty))
                .collect();
            let closure = association_closure(schema, &seeds);
            closure.intersection(exceptions).cloned().collect()
        }
        _ => BTreeSet::new(),
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
    use trailmark_test_utils::{arb_flat_schema, arb_subset};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// The closure terminates on arbitrary (cyclic) schemas and only ever
        /// contains mapped types.
        #[test]
        fn prop_closure_terminates_and_stays_mapped(
            (schema, seeds) in arb_flat_schema(8).prop_flat_map(|(schema, types)| {
                (Just(schema), arb_subset(types))
            }),
        ) {
            let closure = association_closure(&schema, &seeds);
            for ty in &closure {
                prop_assert!(schema.is_mapped(ty));
            }
        }

        /// Expanding the seed set never shrinks the closure.
        #[test]
        fn prop_closure_is_monotone_in_seeds(
            (schema, all_types) in arb_flat_schema(8),
        ) {
            let some: BTreeSet<TypeKey> = all_types.iter().take(1).cloned().collect();
            let more: BTreeSet<TypeKey> = all_types.iter().cloned().collect();
            let small = association_closure(&schema, &some);
            let large = association_closure(&schema, &more);
            prop_assert!(small.is_subset(&large));
        }

        /// Closure of the closure adds nothing new when seeded with its own
        /// members (idempotence of expansion).
        #[test]
        fn prop_closure_is_idempotent(
            (schema, all_types) in arb_flat_schema(8),
        ) {
            let seeds: BTreeSet<TypeKey> = all_types.iter().cloned().collect();
            let once = association_closure(&schema, &seeds);
            let twice = association_closure(&schema, &once);
            prop_assert!(twice.is_subset(&once));
        }
    }
}
