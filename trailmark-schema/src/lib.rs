//! TRAILMARK Schema - Introspection Traits and In-Memory Schema
//!
//! Defines the read-only view of the live object-relational schema that the
//! policy engine walks: which types are mapped, what their properties and
//! association kinds are, and how the subtype hierarchy hangs together. The
//! production implementation is backed by whatever persistence-mapping
//! metadata the host stack offers; [`InMemorySchema`] declares association
//! edges directly and is what tests and embedded setups use.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use trailmark_core::{SchemaError, TypeKey};

// ============================================================================
// SCHEMA METADATA TYPES
// ============================================================================

/// Whether a mapped type can have live instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Instantiable domain type.
    Concrete,
    /// Mapped but abstract; only subtypes have instances.
    Abstract,
    /// Interface mapping; only implementors have instances.
    Interface,
}

/// Kind of a declared property, as the persistence mapping sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Plain value column; never propagates audit status.
    Scalar,
    /// Owned single-valued association.
    OneToOne { target: TypeKey },
    /// Collection association. `many_to_many` marks shared ownership;
    /// those collections never propagate audit status.
    Collection { element: TypeKey, many_to_many: bool },
}

/// A declared property of a mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
}

/// Full metadata for one mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    pub kind: TypeKind,
    /// Direct supertypes (classes and interfaces) that are themselves mapped.
    pub supertypes: Vec<TypeKey>,
    /// Declared properties, in declaration order.
    pub properties: Vec<PropertyDescriptor>,
}

// ============================================================================
// INTROSPECTION TRAITS
// ============================================================================

/// Read-only access to the mapped schema.
///
/// Implementations must answer from a consistent snapshot of the mapping
/// metadata; the policy engine caches derived sets and relies on
/// configuration-change notifications, not schema-change notifications.
pub trait SchemaIntrospector: Send + Sync {
    /// Every type the persistence layer has mapping metadata for.
    fn mapped_types(&self) -> Vec<TypeKey>;

    /// Metadata for one type, or `None` if the type is not mapped.
    fn descriptor(&self, ty: &TypeKey) -> Option<TypeDescriptor>;

    /// Declared properties of a type, in declaration order. Empty when the
    /// type is not mapped.
    fn properties_of(&self, ty: &TypeKey) -> Vec<PropertyDescriptor> {
        self.descriptor(ty)
            .map(|d| d.properties)
            .unwrap_or_default()
    }

    /// Whether the type has mapping metadata.
    fn is_mapped(&self, ty: &TypeKey) -> bool {
        self.descriptor(ty).is_some()
    }

    /// Whether `sub` is a strict subtype of `sup`, transitively.
    /// Never true for `sub == sup`.
    fn is_subtype(&self, sub: &TypeKey, sup: &TypeKey) -> bool;
}

/// Resolves fully-qualified type names to mapped type identities.
pub trait TypeLoader: Send + Sync {
    /// Resolve a name to the mapped type's identity.
    ///
    /// Fails with [`SchemaError::TypeNotFound`] when no mapped type carries
    /// that name.
    fn load_by_name(&self, name: &str) -> Result<TypeKey, SchemaError>;
}

// ============================================================================
// SUBCLASS RESOLUTION
// ============================================================================

/// Concrete mapped subtypes of `ty`, recursively.
///
/// Scans the full mapped-type pool; a candidate is kept when it is a strict
/// subtype of `ty` and is neither abstract nor an interface. Each found
/// subtype is expanded against the same pool, so multi-level hierarchies are
/// resolved in one call. Unmapped input yields an empty set.
pub fn concrete_subclasses<S>(schema: &S, ty: &TypeKey) -> BTreeSet<TypeKey>
where
    S: SchemaIntrospector + ?Sized,
{
    let mut found = BTreeSet::new();
    if !schema.is_mapped(ty) {
        return found;
    }
    let pool = schema.mapped_types();
    let mut expanded = BTreeSet::new();
    collect_subclasses(schema, ty, &pool, &mut found, &mut expanded);
    found
}

fn collect_subclasses<S>(
    schema: &S,
    ty: &TypeKey,
    pool: &[TypeKey],
    found: &mut BTreeSet<TypeKey>,
    expanded: &mut BTreeSet<TypeKey>,
) where
    S: SchemaIntrospector + ?Sized,
{
    if !expanded.insert(ty.clone()) {
        return;
    }
    for candidate in pool {
        if candidate == ty || !schema.is_subtype(candidate, ty) {
            continue;
        }
        let concrete = schema
            .descriptor(candidate)
            .map(|d| d.kind == TypeKind::Concrete)
            .unwrap_or(false);
        if concrete {
            found.insert(candidate.clone());
        }
        collect_subclasses(schema, candidate, pool, found, expanded);
    }
}

// ============================================================================
// IN-MEMORY SCHEMA
// ============================================================================

/// Builder for one [`TypeDescriptor`] in an [`InMemorySchema`].
#[derive(Debug, Clone)]
pub struct TypeDef {
    descriptor: TypeDescriptor,
}

impl TypeDef {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            descriptor: TypeDescriptor {
                key: TypeKey::new(name),
                kind,
                supertypes: Vec::new(),
                properties: Vec::new(),
            },
        }
    }

    /// Declare a concrete type.
    pub fn concrete(name: &str) -> Self {
        Self::new(name, TypeKind::Concrete)
    }

    /// Declare an abstract type.
    pub fn abstract_type(name: &str) -> Self {
        Self::new(name, TypeKind::Abstract)
    }

    /// Declare an interface.
    pub fn interface(name: &str) -> Self {
        Self::new(name, TypeKind::Interface)
    }

    /// Add a direct supertype.
    pub fn extends(mut self, supertype: &str) -> Self {
        self.descriptor.supertypes.push(TypeKey::new(supertype));
        self
    }

    /// Add a scalar property.
    pub fn scalar(mut self, name: &str) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.to_string(),
            kind: PropertyKind::Scalar,
        });
        self
    }

    /// Add an owned one-to-one association.
    pub fn one_to_one(mut self, name: &str, target: &str) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.to_string(),
            kind: PropertyKind::OneToOne {
                target: TypeKey::new(target),
            },
        });
        self
    }

    /// Add an owned one-to-many collection.
    pub fn one_to_many(mut self, name: &str, element: &str) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.to_string(),
            kind: PropertyKind::Collection {
                element: TypeKey::new(element),
                many_to_many: false,
            },
        });
        self
    }

    /// Add a shared many-to-many collection.
    pub fn many_to_many(mut self, name: &str, element: &str) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.to_string(),
            kind: PropertyKind::Collection {
                element: TypeKey::new(element),
                many_to_many: true,
            },
        });
        self
    }
}

/// Builder for [`InMemorySchema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: Vec<TypeDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type definition. Later definitions with the same name
    /// replace earlier ones.
    pub fn define(mut self, def: TypeDef) -> Self {
        self.types.push(def.descriptor);
        self
    }

    pub fn build(self) -> InMemorySchema {
        let mut by_key = HashMap::new();
        for descriptor in self.types {
            by_key.insert(descriptor.key.clone(), descriptor);
        }
        InMemorySchema { by_key }
    }
}

/// In-memory schema that declares types and association edges directly.
///
/// Implements both [`SchemaIntrospector`] and [`TypeLoader`]. Association
/// targets that were never defined are treated as unmapped, which is how the
/// policy layer exercises its skip-unmapped paths.
#[derive(Debug, Clone)]
pub struct InMemorySchema {
    by_key: HashMap<TypeKey, TypeDescriptor>,
}

impl InMemorySchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }
}

impl SchemaIntrospector for InMemorySchema {
    fn mapped_types(&self) -> Vec<TypeKey> {
        let mut types: Vec<TypeKey> = self.by_key.keys().cloned().collect();
        types.sort();
        types
    }

    fn descriptor(&self, ty: &TypeKey) -> Option<TypeDescriptor> {
        self.by_key.get(ty).cloned()
    }

    fn is_subtype(&self, sub: &TypeKey, sup: &TypeKey) -> bool {
        if sub == sup {
            return false;
        }
        // Walk the supertype links transitively. The visited set guards
        // against malformed cyclic hierarchies.
        let mut visited = BTreeSet::new();
        let mut stack = vec![sub.clone()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(descriptor) = self.by_key.get(&current) {
                for parent in &descriptor.supertypes {
                    if parent == sup {
                        return true;
                    }
                    stack.push(parent.clone());
                }
            }
        }
        false
    }
}

impl TypeLoader for InMemorySchema {
    fn load_by_name(&self, name: &str) -> Result<TypeKey, SchemaError> {
        let key = TypeKey::new(name);
        if self.by_key.contains_key(&key) {
            Ok(key)
        } else {
            Err(SchemaError::TypeNotFound {
                name: name.to_string(),
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_schema() -> InMemorySchema {
        InMemorySchema::builder()
            .define(TypeDef::interface("app.Auditable"))
            .define(TypeDef::abstract_type("app.Payment").extends("app.Auditable"))
            .define(
                TypeDef::concrete("app.CardPayment")
                    .extends("app.Payment")
                    .scalar("pan_suffix"),
            )
            .define(
                TypeDef::abstract_type("app.BankPayment").extends("app.Payment"),
            )
            .define(
                TypeDef::concrete("app.WireTransfer")
                    .extends("app.BankPayment")
                    .scalar("iban"),
            )
            .define(TypeDef::concrete("app.Order").one_to_one("payment", "app.Payment"))
            .build()
    }

    #[test]
    fn test_subtype_is_strict_and_transitive() {
        let schema = payment_schema();
        let payment = TypeKey::new("app.Payment");
        let wire = TypeKey::new("app.WireTransfer");
        let auditable = TypeKey::new("app.Auditable");

        assert!(schema.is_subtype(&wire, &payment));
        assert!(schema.is_subtype(&wire, &auditable));
        assert!(!schema.is_subtype(&payment, &payment));
        assert!(!schema.is_subtype(&payment, &wire));
    }

    #[test]
    fn test_concrete_subclasses_multi_level() {
        let schema = payment_schema();
        let subclasses = concrete_subclasses(&schema, &TypeKey::new("app.Payment"));
        let names: Vec<&str> = subclasses.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["app.CardPayment", "app.WireTransfer"]);
    }

    #[test]
    fn test_concrete_subclasses_excludes_abstract_and_interface() {
        let schema = payment_schema();
        let subclasses = concrete_subclasses(&schema, &TypeKey::new("app.Auditable"));
        assert!(!subclasses.contains(&TypeKey::new("app.Payment")));
        assert!(!subclasses.contains(&TypeKey::new("app.BankPayment")));
        assert!(subclasses.contains(&TypeKey::new("app.CardPayment")));
        assert!(subclasses.contains(&TypeKey::new("app.WireTransfer")));
    }

    #[test]
    fn test_concrete_subclasses_of_leaf_is_empty() {
        let schema = payment_schema();
        let subclasses = concrete_subclasses(&schema, &TypeKey::new("app.WireTransfer"));
        assert!(subclasses.is_empty());
    }

    #[test]
    fn test_concrete_subclasses_of_unmapped_is_empty() {
        let schema = payment_schema();
        let subclasses = concrete_subclasses(&schema, &TypeKey::new("app.Ghost"));
        assert!(subclasses.is_empty());
    }

    #[test]
    fn test_properties_preserve_declaration_order() {
        let schema = InMemorySchema::builder()
            .define(
                TypeDef::concrete("app.Order")
                    .scalar("status")
                    .one_to_one("invoice", "app.Invoice")
                    .one_to_many("lines", "app.OrderLine")
                    .many_to_many("tags", "app.Tag"),
            )
            .build();

        let props = schema.properties_of(&TypeKey::new("app.Order"));
        let names: Vec<&str> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["status", "invoice", "lines", "tags"]);
        assert_eq!(
            props[3].kind,
            PropertyKind::Collection {
                element: TypeKey::new("app.Tag"),
                many_to_many: true,
            }
        );
    }

    #[test]
    fn test_properties_of_unmapped_is_empty() {
        let schema = payment_schema();
        assert!(schema.properties_of(&TypeKey::new("app.Ghost")).is_empty());
    }

    #[test]
    fn test_loader_resolves_mapped_names() {
        let schema = payment_schema();
        assert_eq!(
            schema.load_by_name("app.Order"),
            Ok(TypeKey::new("app.Order"))
        );
    }

    #[test]
    fn test_loader_rejects_unknown_names() {
        let schema = payment_schema();
        assert_eq!(
            schema.load_by_name("app.Ghost"),
            Err(SchemaError::TypeNotFound {
                name: "app.Ghost".to_string()
            })
        );
    }

    #[test]
    fn test_subtype_survives_cyclic_hierarchy() {
        // Malformed metadata should not hang the walk.
        let schema = InMemorySchema::builder()
            .define(TypeDef::concrete("app.A").extends("app.B"))
            .define(TypeDef::concrete("app.B").extends("app.A"))
            .define(TypeDef::concrete("app.C"))
            .build();

        assert!(schema.is_subtype(&TypeKey::new("app.A"), &TypeKey::new("app.B")));
        assert!(!schema.is_subtype(&TypeKey::new("app.A"), &TypeKey::new("app.C")));
    }

    #[test]
    fn test_later_definition_replaces_earlier() {
        let schema = InMemorySchema::builder()
            .define(TypeDef::abstract_type("app.Order"))
            .define(TypeDef::concrete("app.Order").scalar("status"))
            .build();

        let descriptor = schema
            .descriptor(&TypeKey::new("app.Order"))
            .expect("mapped");
        assert_eq!(descriptor.kind, TypeKind::Concrete);
        assert_eq!(descriptor.properties.len(), 1);
    }
}
