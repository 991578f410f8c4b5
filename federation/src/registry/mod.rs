//! Registry entries and their status lifecycle.
//!
//! An entry is created at submission (`pending`) and mutated exactly once
//! more, by finalize: to `approved` (with artifact refs and a token id,
//! in one atomic commit), or to `rejected`/`failed` (status alone).
//! Entries are never deleted; `failed` is terminal, not retried.

mod store;

pub use store::{MemoryRegistry, RegistryStore, SharedRegistryStore, StoreError, StoreResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder token id carried until a mint succeeds.
pub const NFT_PENDING: &str = "pending";

/// Lifecycle status of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Submitted, vote in progress or not yet started
    Pending,
    /// Vote passed and artifacts published
    Approved,
    /// Vote failed (no votes, or no strict majority)
    Rejected,
    /// Approved by vote but merge/publish/mint failed
    Failed,
}

impl ModelStatus {
    /// Terminal statuses have no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Failed)
    }

    /// Whether an entry in this status reserves its model_name against
    /// resubmission. Rejected and failed names may be reused.
    pub fn reserves_name(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One registered model proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Primary key
    pub model_id: String,

    pub model_name: String,

    pub task_label: String,

    /// Ledger token id, `"pending"` until minted
    pub nft_id: String,

    /// Content addresses of the published aggregate snapshots; null until
    /// an approval commit
    pub teacher_model_ref: Option<String>,
    pub student_model_ref: Option<String>,
    pub global_model_ref: Option<String>,

    pub status: ModelStatus,

    pub created_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn new(model_name: impl Into<String>, task_label: impl Into<String>) -> Self {
        Self {
            model_id: uuid::Uuid::new_v4().to_string(),
            model_name: model_name.into(),
            task_label: task_label.into(),
            nft_id: NFT_PENDING.to_string(),
            teacher_model_ref: None,
            student_model_ref: None,
            global_model_ref: None,
            status: ModelStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// The artifact refs and token id written together on approval.
#[derive(Debug, Clone)]
pub struct ApprovalRefs {
    pub teacher_model_ref: String,
    pub student_model_ref: String,
    pub global_model_ref: String,
    pub nft_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_starts_pending() {
        let entry = RegistryEntry::new("m1", "ner");
        assert_eq!(entry.status, ModelStatus::Pending);
        assert_eq!(entry.nft_id, NFT_PENDING);
        assert!(entry.teacher_model_ref.is_none());
        assert!(entry.student_model_ref.is_none());
        assert!(entry.global_model_ref.is_none());
    }

    #[test]
    fn test_name_reservation_policy() {
        assert!(ModelStatus::Pending.reserves_name());
        assert!(ModelStatus::Approved.reserves_name());
        assert!(!ModelStatus::Rejected.reserves_name());
        assert!(!ModelStatus::Failed.reserves_name());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ModelStatus::Pending.is_terminal());
        assert!(ModelStatus::Approved.is_terminal());
        assert!(ModelStatus::Rejected.is_terminal());
        assert!(ModelStatus::Failed.is_terminal());
    }
}
