//! TRAILMARK Test Utilities
//!
//! Centralized test infrastructure for the TRAILMARK workspace:
//! - Canned schemas exercising ownership edges, cycles, and hierarchies
//! - Proptest generators for schemas and type-key sets
//! - Convenience re-exports for test code

// Re-export the pieces tests touch constantly
pub use trailmark_core::{AuditingStrategy, TypeKey};
pub use trailmark_schema::{InMemorySchema, SchemaBuilder, TypeDef};

use proptest::prelude::*;
use std::collections::BTreeSet;

/// Build a `BTreeSet<TypeKey>` from names.
pub fn type_keys(names: &[&str]) -> BTreeSet<TypeKey> {
    names.iter().map(|n| TypeKey::new(*n)).collect()
}

// ============================================================================
// CANNED SCHEMAS
// ============================================================================

/// A clinical-records schema: the shape the engine is typically deployed
/// against, with every association kind represented.
///
/// ```text
/// Patient --1:1--> MedicalRecord --1:many--> RecordEntry
/// Patient --1:many--> Visit --1:many--> Observation
/// Visit --many:many--> CareTeam           (shared; never implicit)
/// Observation --1:1--> Attachment
/// Practitioner                            (stands alone)
/// ```
pub fn clinic_schema() -> InMemorySchema {
    InMemorySchema::builder()
        .define(
            TypeDef::concrete("clinic.Patient")
                .scalar("name")
                .one_to_one("record", "clinic.MedicalRecord")
                .one_to_many("visits", "clinic.Visit"),
        )
        .define(
            TypeDef::concrete("clinic.MedicalRecord")
                .one_to_many("entries", "clinic.RecordEntry"),
        )
        .define(TypeDef::concrete("clinic.RecordEntry").scalar("text"))
        .define(
            TypeDef::concrete("clinic.Visit")
                .scalar("date")
                .one_to_many("observations", "clinic.Observation")
                .many_to_many("care_team", "clinic.CareTeam"),
        )
        .define(
            TypeDef::concrete("clinic.Observation")
                .scalar("value")
                .one_to_one("attachment", "clinic.Attachment"),
        )
        .define(TypeDef::concrete("clinic.Attachment").scalar("blob_ref"))
        .define(TypeDef::concrete("clinic.CareTeam").scalar("name"))
        .define(TypeDef::concrete("clinic.Practitioner").scalar("name"))
        .build()
}

/// A payment-type hierarchy with abstract intermediates:
///
/// ```text
/// Auditable (interface)
///   Payment (abstract)
///     CardPayment
///     BankPayment (abstract)
///       WireTransfer
///       DirectDebit
/// Order --1:1--> Payment
/// ```
pub fn payments_schema() -> InMemorySchema {
    InMemorySchema::builder()
        .define(TypeDef::interface("pay.Auditable"))
        .define(TypeDef::abstract_type("pay.Payment").extends("pay.Auditable"))
        .define(
            TypeDef::concrete("pay.CardPayment")
                .extends("pay.Payment")
                .scalar("pan_suffix"),
        )
        .define(TypeDef::abstract_type("pay.BankPayment").extends("pay.Payment"))
        .define(
            TypeDef::concrete("pay.WireTransfer")
                .extends("pay.BankPayment")
                .scalar("iban"),
        )
        .define(
            TypeDef::concrete("pay.DirectDebit")
                .extends("pay.BankPayment")
                .scalar("mandate"),
        )
        .define(TypeDef::concrete("pay.Order").one_to_one("payment", "pay.Payment"))
        .build()
}

/// A two-type ownership cycle plus a bystander.
pub fn cyclic_schema() -> InMemorySchema {
    InMemorySchema::builder()
        .define(TypeDef::concrete("cyc.Left").one_to_one("right", "cyc.Right"))
        .define(TypeDef::concrete("cyc.Right").one_to_one("left", "cyc.Left"))
        .define(TypeDef::concrete("cyc.Bystander"))
        .build()
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Generate a schema of up to `max_types` concrete types with arbitrary
/// owned and shared edges, together with its type keys.
pub fn arb_flat_schema(max_types: usize) -> impl Strategy<Value = (InMemorySchema, Vec<TypeKey>)> {
    let max_types = max_types.max(2);
    (2usize..=max_types).prop_flat_map(|n| {
        let names: Vec<String> = (0..n).map(|i| format!("gen.T{}", i)).collect();
        let edges = proptest::collection::vec((0..n, 0..n, any::<bool>()), 0..n * 2);
        (Just(names), edges).prop_map(|(names, edges)| {
            let mut defs: Vec<TypeDef> = names.iter().map(|n| TypeDef::concrete(n)).collect();
            for (idx, (from, to, shared)) in edges.into_iter().enumerate() {
                let prop_name = format!("edge{}", idx);
                let target = names[to].clone();
                defs[from] = if shared {
                    defs[from].clone().many_to_many(&prop_name, &target)
                } else {
                    defs[from].clone().one_to_many(&prop_name, &target)
                };
            }
            let mut builder = InMemorySchema::builder();
            for def in defs {
                builder = builder.define(def);
            }
            let keys = names.into_iter().map(TypeKey::new).collect();
            (builder.build(), keys)
        })
    })
}

/// Generate a subset of the given keys.
pub fn arb_subset(keys: Vec<TypeKey>) -> impl Strategy<Value = BTreeSet<TypeKey>> {
    let len = keys.len();
    proptest::collection::vec(any::<bool>(), len).prop_map(move |mask| {
        keys.iter()
            .zip(mask)
            .filter(|(_, keep)| *keep)
            .map(|(key, _)| key.clone())
            .collect()
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use trailmark_schema::{concrete_subclasses, SchemaIntrospector};

    #[test]
    fn test_clinic_schema_is_fully_mapped() {
        let schema = clinic_schema();
        assert_eq!(schema.mapped_types().len(), 8);
        assert!(schema.is_mapped(&TypeKey::new("clinic.Patient")));
        assert!(!schema.is_mapped(&TypeKey::new("clinic.Ghost")));
    }

    #[test]
    fn test_payments_hierarchy_resolves() {
        let schema = payments_schema();
        let subclasses = concrete_subclasses(&schema, &TypeKey::new("pay.Payment"));
        assert_eq!(
            subclasses,
            type_keys(&["pay.CardPayment", "pay.DirectDebit", "pay.WireTransfer"])
        );
    }
}
