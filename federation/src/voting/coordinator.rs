//! Voting coordinator: drives a proposal from broadcast through vote
//! collection to a committed terminal status.
//!
//! One coordinator instance is shared by every in-flight proposal task.
//! The finalize path is idempotent — an entry that is already terminal is
//! left untouched — so an interrupted vote can be re-run after restart.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::clients::{SharedChatTransport, SharedContentStore, SharedLedgerClient};
use crate::clients::{MintError, StorageError};
use crate::config::FederationConfig;
use crate::hierarchy::ModelHierarchy;
use crate::merge::MergeError;
use crate::model::ModelBundle;
use crate::registry::{ApprovalRefs, ModelStatus, SharedRegistryStore, StoreError};

use super::session::VotingSession;

/// Error type for coordinator operations
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("registry entry not found: {0}")]
    EntryNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Shared reference to a VotingCoordinator
pub type SharedVotingCoordinator = Arc<VotingCoordinator>;

// Approval side effects that abort finalize and mark the entry failed.
#[derive(Debug, thiserror::Error)]
enum PublishError {
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("artifact upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("mint failed: {0}")]
    Mint(#[from] MintError),

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Orchestrates proposal broadcast, vote collection, tally, and the
/// transactional finalize.
pub struct VotingCoordinator {
    registry: SharedRegistryStore,
    hierarchy: Arc<RwLock<ModelHierarchy>>,
    storage: SharedContentStore,
    ledger: SharedLedgerClient,
    chat: SharedChatTransport,
    config: FederationConfig,
}

impl VotingCoordinator {
    pub fn new(
        registry: SharedRegistryStore,
        hierarchy: Arc<RwLock<ModelHierarchy>>,
        storage: SharedContentStore,
        ledger: SharedLedgerClient,
        chat: SharedChatTransport,
        config: FederationConfig,
    ) -> Self {
        Self {
            registry,
            hierarchy,
            storage,
            ledger,
            chat,
            config,
        }
    }

    pub fn shared(self) -> SharedVotingCoordinator {
        Arc::new(self)
    }

    /// Run one proposal end to end: broadcast, wait out the full voting
    /// window, poll every room, tally, finalize. Returns the committed
    /// terminal status.
    pub async fn run(&self, model_id: &str, bundle: &ModelBundle) -> CoordinatorResult<ModelStatus> {
        let mut session = VotingSession::new(bundle.model_name.clone(), model_id.to_string());

        info!(
            model_id,
            model_name = %bundle.model_name,
            rooms = self.config.voting_rooms.len(),
            window_secs = self.config.voting_duration_secs,
            "voting started"
        );

        self.broadcast_all(&self.proposal_text(bundle, model_id))
            .await;

        // No early termination: the window always runs to completion.
        tokio::time::sleep(self.config.voting_window()).await;

        self.collect_votes(&mut session).await;

        info!(
            model_id,
            yes = session.yes_votes,
            no = session.no_votes,
            "voting window closed"
        );

        self.finalize(&session, bundle).await
    }

    /// Poll each room in sequence. A room that cannot be polled
    /// contributes zero votes; the session continues with the rest.
    async fn collect_votes(&self, session: &mut VotingSession) {
        for room_id in &self.config.voting_rooms {
            match self.chat.poll(room_id).await {
                Ok(messages) => {
                    for message in &messages {
                        session.record_message(room_id, message);
                    }
                }
                Err(e) => {
                    warn!(room_id = %room_id, error = %e, "vote poll failed, room skipped");
                }
            }
        }
    }

    /// Decide and commit the terminal status for a tallied session.
    ///
    /// Idempotent: an already-terminal entry is returned as-is, so a
    /// resumed job never re-merges or re-publishes.
    pub async fn finalize(
        &self,
        session: &VotingSession,
        bundle: &ModelBundle,
    ) -> CoordinatorResult<ModelStatus> {
        let entry = self
            .registry
            .get(&session.model_id)?
            .ok_or_else(|| CoordinatorError::EntryNotFound(session.model_id.clone()))?;

        if entry.status.is_terminal() {
            info!(
                model_id = %entry.model_id,
                status = %entry.status,
                "finalize skipped, entry already terminal"
            );
            return Ok(entry.status);
        }

        if !session.approved() {
            self.registry
                .commit_status(&entry.model_id, ModelStatus::Rejected)?;
            info!(model_id = %entry.model_id, "proposal rejected by vote");
            self.broadcast_all(&self.result_text(&bundle.model_name, false))
                .await;
            return Ok(ModelStatus::Rejected);
        }

        // The hierarchy write lock is held across publish so a failing
        // finalize can restore the pre-merge state without interleaving.
        let mut hierarchy = self.hierarchy.write().await;
        let snapshot = hierarchy.snapshot();

        let status = match self.publish(&mut hierarchy, &entry.model_id, bundle).await {
            Ok(refs) => match self.registry.commit_approval(&entry.model_id, &refs) {
                Ok(_) => {
                    info!(
                        model_id = %entry.model_id,
                        nft_id = %refs.nft_id,
                        "proposal approved and published"
                    );
                    ModelStatus::Approved
                }
                Err(e) => {
                    hierarchy.restore(snapshot);
                    return Err(e.into());
                }
            },
            Err(e) => {
                hierarchy.restore(snapshot);
                error!(model_id = %entry.model_id, error = %e, "finalize failed after approval");
                self.registry
                    .commit_status(&entry.model_id, ModelStatus::Failed)?;
                ModelStatus::Failed
            }
        };
        drop(hierarchy);

        self.broadcast_all(&self.result_text(&bundle.model_name, status == ModelStatus::Approved))
            .await;

        Ok(status)
    }

    // Merge the bundle into all three aggregates, upload their snapshots,
    // and mint the ledger record. Any error aborts with nothing committed.
    async fn publish(
        &self,
        hierarchy: &mut ModelHierarchy,
        model_id: &str,
        bundle: &ModelBundle,
    ) -> Result<ApprovalRefs, PublishError> {
        hierarchy.absorb_bundle(
            &bundle.task_label,
            &bundle.model_name,
            &bundle.model,
            &bundle.tokenizer,
            self.config.ties_threshold,
        )?;

        let teacher_bytes = serde_json::to_vec(&hierarchy.teacher)?;
        let student_bytes = serde_json::to_vec(&hierarchy.student)?;
        let global_bytes = serde_json::to_vec(&hierarchy.global)?;

        let teacher_model_ref = self.storage.put(teacher_bytes).await?;
        let student_model_ref = self.storage.put(student_bytes).await?;
        let global_model_ref = self.storage.put(global_bytes).await?;

        let metadata = json!({
            "model_name": bundle.model_name,
            "model_id": model_id,
            "task_label": bundle.task_label,
            "teacher_model_ref": teacher_model_ref,
            "student_model_ref": student_model_ref,
            "global_model_ref": global_model_ref,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let metadata_cid = self.storage.put(serde_json::to_vec(&metadata)?).await?;

        let nft_id = self
            .ledger
            .mint(json!({
                "model_name": bundle.model_name,
                "metadata_cid": metadata_cid,
            }))
            .await?;

        Ok(ApprovalRefs {
            teacher_model_ref,
            student_model_ref,
            global_model_ref,
            nft_id,
        })
    }

    /// Best-effort broadcast to every configured room; failures are
    /// logged, never raised.
    async fn broadcast_all(&self, text: &str) {
        let sends = self
            .config
            .voting_rooms
            .iter()
            .map(|room_id| async move {
                if let Err(e) = self.chat.broadcast(room_id, text).await {
                    warn!(room_id = %room_id, error = %e, "broadcast failed");
                }
            });
        join_all(sends).await;
    }

    fn proposal_text(&self, bundle: &ModelBundle, model_id: &str) -> String {
        format!(
            "MODEL VOTING PROPOSAL\n\
             --------------------\n\
             Model Name: {}\n\
             Model ID: {}\n\
             Task: {}\n\n\
             VOTING INSTRUCTIONS:\n\
             - Reply 'yes {}' to approve this model\n\
             - Reply 'no {}' to reject this model\n\
             - Voting closes in {} seconds",
            bundle.model_name,
            model_id,
            bundle.task_label,
            model_id,
            model_id,
            self.config.voting_duration_secs
        )
    }

    fn result_text(&self, model_name: &str, approved: bool) -> String {
        format!(
            "MODEL VOTING RESULT\n\
             -------------------\n\
             Model: {}\n\
             Status: {}",
            model_name,
            if approved { "APPROVED" } else { "REJECTED" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ChatTransport, ContentStore, MemoryChat, MemoryContentStore, MemoryLedger};
    use crate::model::{LanguageModel, ParameterSet, Tensor, Tokenizer, TOKEN_EMBEDDING_KEY};
    use crate::registry::{MemoryRegistry, RegistryEntry};
    use async_trait::async_trait;

    fn test_bundle(name: &str, task: &str) -> ModelBundle {
        let mut params = ParameterSet::new();
        params.insert(
            TOKEN_EMBEDDING_KEY,
            Tensor::new(vec![2, 2], vec![0.5; 4]).unwrap(),
        );
        ModelBundle::new(
            name,
            task,
            LanguageModel::new(params),
            Tokenizer::from_tokens(["a", "b"]),
        )
    }

    fn test_config() -> FederationConfig {
        FederationConfig {
            voting_rooms: vec!["!room:example.org".to_string()],
            voting_duration_secs: 0,
            ..FederationConfig::default()
        }
    }

    struct TestRig {
        coordinator: VotingCoordinator,
        chat: Arc<MemoryChat>,
        registry: SharedRegistryStore,
        hierarchy: Arc<RwLock<ModelHierarchy>>,
    }

    fn rig_with_storage(storage: SharedContentStore) -> TestRig {
        let registry: SharedRegistryStore = MemoryRegistry::new().shared();
        let hierarchy = Arc::new(RwLock::new(ModelHierarchy::new()));
        let chat = MemoryChat::new().shared();
        let coordinator = VotingCoordinator::new(
            registry.clone(),
            hierarchy.clone(),
            storage,
            MemoryLedger::new().shared(),
            chat.clone(),
            test_config(),
        );
        TestRig {
            coordinator,
            chat,
            registry,
            hierarchy,
        }
    }

    fn rig() -> TestRig {
        rig_with_storage(MemoryContentStore::new().shared())
    }

    // ── Approval path ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_majority_approves_and_publishes() {
        let rig = rig();
        let bundle = test_bundle("m1", "ner");
        let entry = RegistryEntry::new("m1", "ner");
        rig.registry.insert(&entry).unwrap();

        rig.chat
            .push_message("!room:example.org", "@a", &format!("yes {}", entry.model_id));
        rig.chat
            .push_message("!room:example.org", "@b", &format!("yes {}", entry.model_id));
        rig.chat
            .push_message("!room:example.org", "@c", &format!("no {}", entry.model_id));

        let status = rig.coordinator.run(&entry.model_id, &bundle).await.unwrap();
        assert_eq!(status, ModelStatus::Approved);

        let committed = rig.registry.get(&entry.model_id).unwrap().unwrap();
        assert_eq!(committed.status, ModelStatus::Approved);
        assert!(committed.teacher_model_ref.is_some());
        assert!(committed.student_model_ref.is_some());
        assert!(committed.global_model_ref.is_some());
        assert_ne!(committed.nft_id, crate::registry::NFT_PENDING);

        // Proposal first, result last.
        let broadcasts = rig.chat.broadcasts();
        assert_eq!(broadcasts.len(), 2);
        assert!(broadcasts[0].1.contains("VOTING PROPOSAL"));
        assert!(broadcasts[1].1.contains("APPROVED"));

        // The hierarchy absorbed the contribution.
        let hierarchy = rig.hierarchy.read().await;
        assert!(hierarchy.teacher.get("ner", "m1").is_some());
        assert!(hierarchy.student.task("ner").unwrap().is_complete());
    }

    // ── Rejection paths ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_tie_rejects() {
        let rig = rig();
        let bundle = test_bundle("m1", "ner");
        let entry = RegistryEntry::new("m1", "ner");
        rig.registry.insert(&entry).unwrap();

        rig.chat
            .push_message("!room:example.org", "@a", &format!("yes {}", entry.model_id));
        rig.chat
            .push_message("!room:example.org", "@b", &format!("no {}", entry.model_id));

        let status = rig.coordinator.run(&entry.model_id, &bundle).await.unwrap();
        assert_eq!(status, ModelStatus::Rejected);

        let committed = rig.registry.get(&entry.model_id).unwrap().unwrap();
        assert_eq!(committed.status, ModelStatus::Rejected);
        assert!(committed.teacher_model_ref.is_none());

        // Nothing merged for a rejected proposal.
        let hierarchy = rig.hierarchy.read().await;
        assert!(hierarchy.teacher.get("ner", "m1").is_none());
    }

    #[tokio::test]
    async fn test_votes_for_other_proposals_ignored() {
        let rig = rig();
        let bundle = test_bundle("m1", "ner");
        let entry = RegistryEntry::new("m1", "ner");
        rig.registry.insert(&entry).unwrap();

        rig.chat
            .push_message("!room:example.org", "@a", "yes some-other-id");
        rig.chat.push_message(
            "!room:example.org",
            "@b",
            &format!("yes {} trailing", entry.model_id),
        );

        let status = rig.coordinator.run(&entry.model_id, &bundle).await.unwrap();
        assert_eq!(status, ModelStatus::Rejected);
    }

    // ── Failure path ───────────────────────────────────────────────────

    struct FailingStore;

    #[async_trait]
    impl ContentStore for FailingStore {
        async fn put(&self, _bytes: Vec<u8>) -> Result<String, crate::clients::StorageError> {
            Err(crate::clients::StorageError::Http("connection refused".to_string()))
        }

        async fn get(&self, cid: &str) -> Result<Vec<u8>, crate::clients::StorageError> {
            Err(crate::clients::StorageError::NotFound(cid.to_string()))
        }
    }

    #[tokio::test]
    async fn test_upload_failure_marks_failed_and_rolls_back() {
        let rig = rig_with_storage(Arc::new(FailingStore));
        let bundle = test_bundle("m1", "ner");
        let entry = RegistryEntry::new("m1", "ner");
        rig.registry.insert(&entry).unwrap();

        rig.chat
            .push_message("!room:example.org", "@a", &format!("yes {}", entry.model_id));

        let status = rig.coordinator.run(&entry.model_id, &bundle).await.unwrap();
        assert_eq!(status, ModelStatus::Failed);

        let committed = rig.registry.get(&entry.model_id).unwrap().unwrap();
        assert_eq!(committed.status, ModelStatus::Failed);
        assert!(committed.teacher_model_ref.is_none());
        assert_eq!(committed.nft_id, crate::registry::NFT_PENDING);

        // The in-memory merge was rolled back with the failure.
        let hierarchy = rig.hierarchy.read().await;
        assert!(hierarchy.teacher.get("ner", "m1").is_none());
        assert!(hierarchy.student.task("ner").is_none());
    }

    // ── Idempotent finalize ────────────────────────────────────────────

    #[tokio::test]
    async fn test_finalize_skips_terminal_entry() {
        let rig = rig();
        let bundle = test_bundle("m1", "ner");
        let entry = RegistryEntry::new("m1", "ner");
        rig.registry.insert(&entry).unwrap();
        rig.registry
            .commit_status(&entry.model_id, ModelStatus::Rejected)
            .unwrap();

        // Re-running the job (e.g. after a restart race) must not flip
        // the committed outcome or touch the hierarchy.
        let status = rig.coordinator.run(&entry.model_id, &bundle).await.unwrap();
        assert_eq!(status, ModelStatus::Rejected);
    }

    // ── Degraded transport ─────────────────────────────────────────────

    struct DeadChat;

    #[async_trait]
    impl ChatTransport for DeadChat {
        async fn broadcast(&self, room_id: &str, _text: &str) -> Result<(), crate::clients::TransportError> {
            Err(crate::clients::TransportError::UnknownRoom(room_id.to_string()))
        }

        async fn poll(&self, room_id: &str) -> Result<Vec<crate::clients::ChatMessage>, crate::clients::TransportError> {
            Err(crate::clients::TransportError::UnknownRoom(room_id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_unreachable_rooms_degrade_to_rejection() {
        let registry: SharedRegistryStore = MemoryRegistry::new().shared();
        let hierarchy = Arc::new(RwLock::new(ModelHierarchy::new()));
        let coordinator = VotingCoordinator::new(
            registry.clone(),
            hierarchy,
            MemoryContentStore::new().shared(),
            MemoryLedger::new().shared(),
            Arc::new(DeadChat),
            test_config(),
        );

        let bundle = test_bundle("m1", "ner");
        let entry = RegistryEntry::new("m1", "ner");
        registry.insert(&entry).unwrap();

        // Every room fails to poll: zero votes, which is a rejection,
        // never a session abort.
        let status = coordinator.run(&entry.model_id, &bundle).await.unwrap();
        assert_eq!(status, ModelStatus::Rejected);
    }
}
