//! Audit entry store boundary.
//!
//! Persisting and querying the entries themselves is ordinary CRUD; the
//! trait pins down the two behaviors callers rely on: reads are filtered,
//! paginated, and newest-first, and a cascaded write persists the parent
//! entry before its children.

use std::sync::RwLock;
use trailmark_core::{AuditEntry, AuditEntryQuery, StoreError, TrailmarkResult};
use uuid::Uuid;

/// Storage for recorded audit entries.
pub trait AuditEntryStore: Send + Sync {
    /// Persist one entry.
    ///
    /// An entry referencing a parent that is not persisted is rejected with
    /// [`StoreError::MissingParent`]; use [`save_chain`](Self::save_chain)
    /// for cascaded writes.
    fn save(&self, entry: &AuditEntry) -> TrailmarkResult<()>;

    /// Persist a parent entry and its child entries, parent first.
    ///
    /// Each child is linked to the parent before being written.
    fn save_chain(&self, parent: &AuditEntry, children: &[AuditEntry]) -> TrailmarkResult<()> {
        self.save(parent)?;
        for child in children {
            let mut child = child.clone();
            child.parent_entry_id = Some(parent.entry_id);
            self.save(&child)?;
        }
        Ok(())
    }

    /// Entries matching the query, newest first.
    fn query(&self, query: &AuditEntryQuery) -> TrailmarkResult<Vec<AuditEntry>>;

    /// Remove one entry.
    fn delete(&self, entry_id: Uuid) -> TrailmarkResult<()>;
}

// ============================================================================
// IN-MEMORY AUDIT ENTRY STORE
// ============================================================================

/// In-memory reference implementation for tests and embedded setups.
#[derive(Debug, Default)]
pub struct InMemoryAuditEntryStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches(entry: &AuditEntry, query: &AuditEntryQuery) -> bool {
    if let Some(object_uuid) = query.object_uuid {
        if entry.object_uuid != object_uuid {
            return false;
        }
    }
    if let Some(types) = &query.object_types {
        if !types.contains(&entry.object_type) {
            return false;
        }
    }
    if let Some(actions) = &query.actions {
        if !actions.contains(&entry.action) {
            return false;
        }
    }
    if let Some(from) = query.from {
        if entry.occurred_at < from {
            return false;
        }
    }
    if let Some(until) = query.until {
        if entry.occurred_at > until {
            return false;
        }
    }
    if query.exclude_child_entries && entry.parent_entry_id.is_some() {
        return false;
    }
    true
}

impl AuditEntryStore for InMemoryAuditEntryStore {
    fn save(&self, entry: &AuditEntry) -> TrailmarkResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(parent_entry_id) = entry.parent_entry_id {
            if !entries.iter().any(|e| e.entry_id == parent_entry_id) {
                return Err(StoreError::MissingParent {
                    entry_id: entry.entry_id,
                    parent_entry_id,
                }
                .into());
            }
        }
        if let Some(existing) = entries.iter_mut().find(|e| e.entry_id == entry.entry_id) {
            *existing = entry.clone();
        } else {
            entries.push(entry.clone());
        }
        Ok(())
    }

    fn query(&self, query: &AuditEntryQuery) -> TrailmarkResult<Vec<AuditEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<AuditEntry> = entries
            .iter()
            .filter(|entry| matches(entry, query))
            .cloned()
            .collect();
        // Newest first; entry ids are timestamp-sortable and break ties.
        hits.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.entry_id.cmp(&a.entry_id))
        });
        let offset = query.offset.unwrap_or(0);
        let mut page: Vec<AuditEntry> = hits.into_iter().skip(offset).collect();
        if let Some(limit) = query.limit {
            if limit > 0 {
                page.truncate(limit);
            }
        }
        Ok(page)
    }

    fn delete(&self, entry_id: Uuid) -> TrailmarkResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.entry_id != entry_id);
        if entries.len() == before {
            return Err(StoreError::EntryNotFound { entry_id }.into());
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
