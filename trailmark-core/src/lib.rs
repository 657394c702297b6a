//! TRAILMARK Core - Audit Policy Data Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no policy logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 audit entry id (timestamp-sortable).
pub fn new_entry_id() -> Uuid {
    Uuid::now_v7()
}

/// Identity of a mapped persistent domain type.
///
/// Wraps the fully-qualified type name as registered with the schema.
/// All policy sets key on `TypeKey`; two keys are equal exactly when their
/// names are equal. The name is also the persisted representation in the
/// exception-list configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(String);

impl TypeKey {
    /// Create a key from a fully-qualified type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The fully-qualified type name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ============================================================================
// ENUMS
// ============================================================================

/// Global policy mode selecting how audit inclusion is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditingStrategy {
    /// No type is audited.
    None,
    /// Every mapped type is audited.
    All,
    /// Only the types in the exception set are audited.
    NoneExcept,
    /// Every mapped type except those in the exception set is audited.
    AllExcept,
}

impl AuditingStrategy {
    /// Whether this strategy consults the exception set.
    pub fn is_exception_based(&self) -> bool {
        matches!(self, AuditingStrategy::NoneExcept | AuditingStrategy::AllExcept)
    }

    /// Convert to the persisted configuration string.
    pub fn as_config_str(&self) -> &'static str {
        match self {
            AuditingStrategy::None => "NONE",
            AuditingStrategy::All => "ALL",
            AuditingStrategy::NoneExcept => "NONE_EXCEPT",
            AuditingStrategy::AllExcept => "ALL_EXCEPT",
        }
    }

    /// Parse from the persisted configuration string.
    ///
    /// Surrounding whitespace is tolerated; the name itself is exact.
    pub fn from_config_str(s: &str) -> Result<Self, StrategyParseError> {
        match s.trim() {
            "NONE" => Ok(AuditingStrategy::None),
            "ALL" => Ok(AuditingStrategy::All),
            "NONE_EXCEPT" => Ok(AuditingStrategy::NoneExcept),
            "ALL_EXCEPT" => Ok(AuditingStrategy::AllExcept),
            other => Err(StrategyParseError(other.to_string())),
        }
    }
}

impl fmt::Display for AuditingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

impl FromStr for AuditingStrategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_config_str(s)
    }
}

/// Error parsing an [`AuditingStrategy`] from its configuration string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown auditing strategy: {0}")]
pub struct StrategyParseError(pub String);

/// Kind of mutation recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
}

impl AuditAction {
    /// Convert to the persisted string representation.
    pub fn as_config_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "CREATED",
            AuditAction::Updated => "UPDATED",
            AuditAction::Deleted => "DELETED",
        }
    }

    /// Parse from the persisted string representation.
    pub fn from_config_str(s: &str) -> Result<Self, ActionParseError> {
        match s.trim() {
            "CREATED" => Ok(AuditAction::Created),
            "UPDATED" => Ok(AuditAction::Updated),
            "DELETED" => Ok(AuditAction::Deleted),
            other => Err(ActionParseError(other.to_string())),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

impl FromStr for AuditAction {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_config_str(s)
    }
}

/// Error parsing an [`AuditAction`] from its string representation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown audit action: {0}")]
pub struct ActionParseError(pub String);

// ============================================================================
// AUDIT ENTRY STRUCTS
// ============================================================================

/// A recorded mutation of a persistent domain object.
///
/// Child entries (cascaded collection updates) reference the entry for the
/// owning object through `parent_entry_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub object_type: TypeKey,
    pub object_uuid: Uuid,
    pub action: AuditAction,
    /// Serialized field deltas, produced by the caller. Trailmark does not
    /// compute diffs; it only carries them.
    pub changes: Option<serde_json::Value>,
    pub occurred_at: Timestamp,
    pub actor: Option<String>,
    pub parent_entry_id: Option<Uuid>,
}

impl AuditEntry {
    /// Create an entry for a mutation happening now, with a fresh id.
    pub fn new(object_type: TypeKey, object_uuid: Uuid, action: AuditAction) -> Self {
        Self {
            entry_id: new_entry_id(),
            object_type,
            object_uuid,
            action,
            changes: None,
            occurred_at: Utc::now(),
            actor: None,
            parent_entry_id: None,
        }
    }

    /// Attach serialized field deltas.
    pub fn with_changes(mut self, changes: serde_json::Value) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Attach the acting principal.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Link this entry to the entry of the owning object.
    pub fn with_parent(mut self, parent_entry_id: Uuid) -> Self {
        self.parent_entry_id = Some(parent_entry_id);
        self
    }
}

/// Filter and pagination for audit entry reads.
///
/// All filters are conjunctive; unset filters match everything. Results are
/// ordered newest-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditEntryQuery {
    /// Match entries for this object only.
    pub object_uuid: Option<Uuid>,
    /// Match entries whose object type is in this list.
    pub object_types: Option<Vec<TypeKey>>,
    /// Match entries whose action is in this list.
    pub actions: Option<Vec<AuditAction>>,
    /// Inclusive lower bound on `occurred_at`.
    pub from: Option<Timestamp>,
    /// Inclusive upper bound on `occurred_at`.
    pub until: Option<Timestamp>,
    /// Keep only entries without a parent (top-level mutations).
    pub exclude_child_entries: bool,
    /// Number of matching entries to skip.
    pub offset: Option<usize>,
    /// Maximum number of entries to return. Zero means unbounded.
    pub limit: Option<usize>,
}

impl AuditEntryQuery {
    /// Create an unfiltered query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by object uuid.
    pub fn for_object(mut self, object_uuid: Uuid) -> Self {
        self.object_uuid = Some(object_uuid);
        self
    }

    /// Filter by object types.
    pub fn with_types(mut self, types: Vec<TypeKey>) -> Self {
        self.object_types = Some(types);
        self
    }

    /// Filter by actions.
    pub fn with_actions(mut self, actions: Vec<AuditAction>) -> Self {
        self.actions = Some(actions);
        self
    }

    /// Bound the time range.
    pub fn between(mut self, from: Option<Timestamp>, until: Option<Timestamp>) -> Self {
        self.from = from;
        self.until = until;
        self
    }

    /// Keep only top-level entries.
    pub fn top_level_only(mut self) -> Self {
        self.exclude_child_entries = true;
        self
    }

    /// Paginate the result.
    pub fn paged(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Schema lookup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Type not found: {name}")]
    TypeNotFound { name: String },
}

/// Policy state errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Cannot {operation} while the auditing strategy is {strategy}")]
    WrongStrategy {
        strategy: AuditingStrategy,
        operation: String,
    },
}

/// Configuration store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to persist configuration value for {key}: {reason}")]
    PersistFailed { key: String, reason: String },

    #[error("Malformed configuration value for {key}: {value} - {reason}")]
    MalformedValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Audit entry store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entry not found: {entry_id}")]
    EntryNotFound { entry_id: Uuid },

    #[error("Parent entry {parent_entry_id} of {entry_id} is not persisted")]
    MissingParent {
        entry_id: Uuid,
        parent_entry_id: Uuid,
    },
}

/// Master error type for all TRAILMARK errors.
#[derive(Debug, Clone, Error)]
pub enum TrailmarkError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for TRAILMARK operations.
pub type TrailmarkResult<T> = Result<T, TrailmarkError>;

// ============================================================================
// CONFIGURATION KEYS
// ============================================================================

/// Persisted configuration keys. All values are human-editable strings.
pub mod config_keys {
    /// Holds one of the four [`AuditingStrategy`](super::AuditingStrategy)
    /// names.
    pub const AUDITING_STRATEGY: &str = "trailmark.auditing_strategy";

    /// Holds a comma-separated list of fully-qualified type names. Whitespace
    /// around each name is trimmed on read.
    pub const AUDITED_EXCEPTIONS: &str = "trailmark.audited_exceptions";

    /// Holds a boolean-parseable string.
    pub const STORE_LAST_STATE_OF_DELETED_ITEMS: &str =
        "trailmark.store_last_state_of_deleted_items";
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_id_is_v7() {
        let id = new_entry_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_type_key_equality_is_name_equality() {
        let a = TypeKey::new("app.Order");
        let b = TypeKey::new("app.Order");
        let c = TypeKey::new("app.Invoice");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.name(), "app.Order");
    }

    #[test]
    fn test_type_key_orders_by_name() {
        let mut keys = vec![
            TypeKey::new("app.Order"),
            TypeKey::new("app.Customer"),
            TypeKey::new("app.Invoice"),
        ];
        keys.sort();
        let names: Vec<&str> = keys.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["app.Customer", "app.Invoice", "app.Order"]);
    }

    #[test]
    fn test_strategy_config_str_round_trip() {
        for strategy in [
            AuditingStrategy::None,
            AuditingStrategy::All,
            AuditingStrategy::NoneExcept,
            AuditingStrategy::AllExcept,
        ] {
            let parsed = AuditingStrategy::from_config_str(strategy.as_config_str())
                .expect("canonical name should parse");
            assert_eq!(parsed, strategy);
        }
    }

    #[test]
    fn test_strategy_parse_trims_whitespace() {
        assert_eq!(
            AuditingStrategy::from_config_str("  ALL_EXCEPT "),
            Ok(AuditingStrategy::AllExcept)
        );
    }

    #[test]
    fn test_strategy_parse_rejects_unknown() {
        let err = AuditingStrategy::from_config_str("SOME").unwrap_err();
        assert_eq!(err, StrategyParseError("SOME".to_string()));
    }

    #[test]
    fn test_strategy_exception_based() {
        assert!(!AuditingStrategy::None.is_exception_based());
        assert!(!AuditingStrategy::All.is_exception_based());
        assert!(AuditingStrategy::NoneExcept.is_exception_based());
        assert!(AuditingStrategy::AllExcept.is_exception_based());
    }

    #[test]
    fn test_action_config_str_round_trip() {
        for action in [
            AuditAction::Created,
            AuditAction::Updated,
            AuditAction::Deleted,
        ] {
            let parsed = AuditAction::from_config_str(action.as_config_str())
                .expect("canonical name should parse");
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_audit_entry_builder() {
        let entry = AuditEntry::new(
            TypeKey::new("app.Order"),
            Uuid::nil(),
            AuditAction::Updated,
        )
        .with_actor("admin")
        .with_changes(serde_json::json!({"status": ["Open", "Shipped"]}));

        assert_eq!(entry.action, AuditAction::Updated);
        assert_eq!(entry.actor.as_deref(), Some("admin"));
        assert!(entry.changes.is_some());
        assert!(entry.parent_entry_id.is_none());
    }

    #[test]
    fn test_audit_entry_serde_round_trip() {
        let entry = AuditEntry::new(
            TypeKey::new("app.Order"),
            Uuid::nil(),
            AuditAction::Created,
        );
        let json = serde_json::to_string(&entry).expect("serialize");
        let back: AuditEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
    }

    #[test]
    fn test_query_builder() {
        let query = AuditEntryQuery::new()
            .with_types(vec![TypeKey::new("app.Order")])
            .with_actions(vec![AuditAction::Deleted])
            .top_level_only()
            .paged(10, 25);

        assert_eq!(query.object_types.as_ref().map(Vec::len), Some(1));
        assert!(query.exclude_child_entries);
        assert_eq!(query.offset, Some(10));
        assert_eq!(query.limit, Some(25));
    }

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::WrongStrategy {
            strategy: AuditingStrategy::None,
            operation: "start auditing".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("start auditing"));
        assert!(msg.contains("NONE"));
    }

    #[test]
    fn test_trailmark_error_from_variants() {
        let schema = TrailmarkError::from(SchemaError::TypeNotFound {
            name: "app.Ghost".to_string(),
        });
        assert!(matches!(schema, TrailmarkError::Schema(_)));

        let policy = TrailmarkError::from(PolicyError::WrongStrategy {
            strategy: AuditingStrategy::All,
            operation: "stop auditing".to_string(),
        });
        assert!(matches!(policy, TrailmarkError::Policy(_)));

        let config = TrailmarkError::from(ConfigError::PersistFailed {
            key: config_keys::AUDITED_EXCEPTIONS.to_string(),
            reason: "store offline".to_string(),
        });
        assert!(matches!(config, TrailmarkError::Config(_)));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
