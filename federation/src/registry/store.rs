//! Transactional registry store.
//!
//! Persistence mechanics are a collaborator concern; the pipeline only
//! needs create/read/update keyed by model_id with a name-uniqueness
//! constraint over the active subset, and each mutation applied as one
//! atomic write. `MemoryRegistry` is the in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{ApprovalRefs, ModelStatus, RegistryEntry};

/// Error type for registry store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("model name '{0}' already has an active entry")]
    DuplicateName(String),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("entry {model_id} is already terminal ({status})")]
    AlreadyTerminal {
        model_id: String,
        status: ModelStatus,
    },

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Result type for registry store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a registry store
pub type SharedRegistryStore = Arc<dyn RegistryStore>;

/// Transactional create/read/update over registry entries.
pub trait RegistryStore: Send + Sync {
    /// Insert a new pending entry. Fails with `DuplicateName` when an
    /// entry whose status reserves the name already exists; nothing is
    /// written in that case.
    fn insert(&self, entry: &RegistryEntry) -> StoreResult<()>;

    fn get(&self, model_id: &str) -> StoreResult<Option<RegistryEntry>>;

    /// Most recent entry carrying the given model_name.
    fn get_by_name(&self, model_name: &str) -> StoreResult<Option<RegistryEntry>>;

    /// Atomic approval commit: all three refs, the token id, and
    /// status=approved written together.
    fn commit_approval(&self, model_id: &str, refs: &ApprovalRefs) -> StoreResult<RegistryEntry>;

    /// Atomic terminal commit of status alone (rejected/failed).
    fn commit_status(&self, model_id: &str, status: ModelStatus) -> StoreResult<RegistryEntry>;

    /// All entries currently in the given status.
    fn list_by_status(&self, status: ModelStatus) -> StoreResult<Vec<RegistryEntry>>;
}

/// In-memory registry store backed by a `RwLock`ed map.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedRegistryStore {
        Arc::new(self)
    }

    fn terminal_guard(entry: &RegistryEntry) -> StoreResult<()> {
        if entry.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                model_id: entry.model_id.clone(),
                status: entry.status,
            });
        }
        Ok(())
    }
}

impl RegistryStore for MemoryRegistry {
    fn insert(&self, entry: &RegistryEntry) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;

        let conflict = entries
            .values()
            .any(|e| e.model_name == entry.model_name && e.status.reserves_name());
        if conflict {
            return Err(StoreError::DuplicateName(entry.model_name.clone()));
        }

        entries.insert(entry.model_id.clone(), entry.clone());
        Ok(())
    }

    fn get(&self, model_id: &str) -> StoreResult<Option<RegistryEntry>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(model_id).cloned())
    }

    fn get_by_name(&self, model_name: &str) -> StoreResult<Option<RegistryEntry>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut matching: Vec<&RegistryEntry> = entries
            .values()
            .filter(|e| e.model_name == model_name)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.first().map(|e| (*e).clone()))
    }

    fn commit_approval(&self, model_id: &str, refs: &ApprovalRefs) -> StoreResult<RegistryEntry> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let entry = entries
            .get_mut(model_id)
            .ok_or_else(|| StoreError::NotFound(model_id.to_string()))?;
        Self::terminal_guard(entry)?;

        entry.teacher_model_ref = Some(refs.teacher_model_ref.clone());
        entry.student_model_ref = Some(refs.student_model_ref.clone());
        entry.global_model_ref = Some(refs.global_model_ref.clone());
        entry.nft_id = refs.nft_id.clone();
        entry.status = ModelStatus::Approved;
        Ok(entry.clone())
    }

    fn commit_status(&self, model_id: &str, status: ModelStatus) -> StoreResult<RegistryEntry> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let entry = entries
            .get_mut(model_id)
            .ok_or_else(|| StoreError::NotFound(model_id.to_string()))?;
        Self::terminal_guard(entry)?;

        entry.status = status;
        Ok(entry.clone())
    }

    fn list_by_status(&self, status: ModelStatus) -> StoreResult<Vec<RegistryEntry>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut matching: Vec<RegistryEntry> = entries
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs() -> ApprovalRefs {
        ApprovalRefs {
            teacher_model_ref: "Qm-teacher".to_string(),
            student_model_ref: "Qm-student".to_string(),
            global_model_ref: "Qm-global".to_string(),
            nft_id: "0xabc".to_string(),
        }
    }

    #[test]
    fn test_duplicate_active_name_rejected() {
        let store = MemoryRegistry::new();
        store.insert(&RegistryEntry::new("m1", "ner")).unwrap();

        let err = store.insert(&RegistryEntry::new("m1", "qa")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
    }

    #[test]
    fn test_rejected_name_can_be_resubmitted() {
        let store = MemoryRegistry::new();
        let first = RegistryEntry::new("m1", "ner");
        store.insert(&first).unwrap();
        store
            .commit_status(&first.model_id, ModelStatus::Rejected)
            .unwrap();

        // Fresh model_id, same name: allowed once the old entry no longer
        // reserves it.
        let second = RegistryEntry::new("m1", "ner");
        store.insert(&second).unwrap();
        assert_ne!(first.model_id, second.model_id);
    }

    #[test]
    fn test_approved_name_stays_reserved() {
        let store = MemoryRegistry::new();
        let entry = RegistryEntry::new("m1", "ner");
        store.insert(&entry).unwrap();
        store.commit_approval(&entry.model_id, &refs()).unwrap();

        assert!(store.insert(&RegistryEntry::new("m1", "ner")).is_err());
    }

    #[test]
    fn test_approval_commit_is_complete() {
        let store = MemoryRegistry::new();
        let entry = RegistryEntry::new("m1", "ner");
        store.insert(&entry).unwrap();

        let committed = store.commit_approval(&entry.model_id, &refs()).unwrap();
        assert_eq!(committed.status, ModelStatus::Approved);
        assert_eq!(committed.nft_id, "0xabc");
        assert_eq!(committed.teacher_model_ref.as_deref(), Some("Qm-teacher"));
        assert_eq!(committed.student_model_ref.as_deref(), Some("Qm-student"));
        assert_eq!(committed.global_model_ref.as_deref(), Some("Qm-global"));
    }

    #[test]
    fn test_terminal_entries_cannot_transition() {
        let store = MemoryRegistry::new();
        let entry = RegistryEntry::new("m1", "ner");
        store.insert(&entry).unwrap();
        store
            .commit_status(&entry.model_id, ModelStatus::Failed)
            .unwrap();

        assert!(matches!(
            store.commit_status(&entry.model_id, ModelStatus::Rejected),
            Err(StoreError::AlreadyTerminal { .. })
        ));
        assert!(store.commit_approval(&entry.model_id, &refs()).is_err());
    }

    #[test]
    fn test_get_by_name_returns_latest() {
        let store = MemoryRegistry::new();
        let first = RegistryEntry::new("m1", "ner");
        store.insert(&first).unwrap();
        store
            .commit_status(&first.model_id, ModelStatus::Rejected)
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));

        let second = RegistryEntry::new("m1", "ner");
        store.insert(&second).unwrap();

        let latest = store.get_by_name("m1").unwrap().unwrap();
        assert_eq!(latest.model_id, second.model_id);
    }
}
