//! Submission pipeline: validates an incoming bundle, creates the pending
//! registry entry, persists the bundle on disk as the durable job record,
//! and hands off to the voting coordinator in the background.
//!
//! The submit call returns as soon as the vote job is dispatched; merge,
//! storage, and mint failures only ever surface later through the status
//! query.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::archive::{self, ArchiveError};
use crate::clients::{SharedContentStore, StorageError};
use crate::model::{LanguageModel, ModelBundle, Tokenizer};
use crate::registry::{ModelStatus, RegistryEntry, SharedRegistryStore, StoreError};
use crate::voting::SharedVotingCoordinator;

/// Required file inside the model archive.
pub const MODEL_FILE: &str = "model.json";

/// Required file inside the tokenizer archive.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Error type for submissions
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("model name '{0}' already has an active entry")]
    Conflict(String),

    #[error("failed to persist bundle: {0}")]
    Persist(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(StoreError),
}

/// Error type for status and artifact queries
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("model '{model_id}' is not approved (status: {status})")]
    NotApproved {
        model_id: String,
        status: ModelStatus,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Accepted-for-voting response.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub model_id: String,
    pub status: String,
}

/// The submission surface: bundle in, receipt out, voting in the
/// background.
pub struct SubmissionPipeline {
    registry: SharedRegistryStore,
    coordinator: SharedVotingCoordinator,
    storage: SharedContentStore,
    models_dir: PathBuf,
}

impl SubmissionPipeline {
    pub fn new(
        registry: SharedRegistryStore,
        coordinator: SharedVotingCoordinator,
        storage: SharedContentStore,
        models_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            coordinator,
            storage,
            models_dir: models_dir.into(),
        }
    }

    /// Submit a model as two zip archives. Both archives are validated
    /// for their required files before anything is written.
    pub async fn submit(
        &self,
        model_name: &str,
        task_label: &str,
        model_archive: &[u8],
        tokenizer_archive: &[u8],
    ) -> Result<SubmissionReceipt, SubmitError> {
        if model_name.trim().is_empty() {
            return Err(SubmitError::Validation("model_name is required".to_string()));
        }
        if task_label.trim().is_empty() {
            return Err(SubmitError::Validation("task_label is required".to_string()));
        }

        let model_bytes = archive::extract_file(model_archive, MODEL_FILE)
            .map_err(|e| SubmitError::Validation(e.to_string()))?;
        let tokenizer_bytes = archive::extract_file(tokenizer_archive, TOKENIZER_FILE)
            .map_err(|e| SubmitError::Validation(e.to_string()))?;

        let model: LanguageModel = serde_json::from_slice(&model_bytes)
            .map_err(|e| SubmitError::Validation(format!("malformed {MODEL_FILE}: {e}")))?;
        let tokenizer: Tokenizer = serde_json::from_slice(&tokenizer_bytes)
            .map_err(|e| SubmitError::Validation(format!("malformed {TOKENIZER_FILE}: {e}")))?;

        self.submit_bundle(ModelBundle::new(model_name, task_label, model, tokenizer))
            .await
    }

    /// Submit an already-unpacked bundle.
    pub async fn submit_bundle(&self, bundle: ModelBundle) -> Result<SubmissionReceipt, SubmitError> {
        let entry = RegistryEntry::new(bundle.model_name.clone(), bundle.task_label.clone());

        // The uniqueness check and the insert are one atomic step; a
        // duplicate active name mutates nothing.
        self.registry.insert(&entry).map_err(|e| match e {
            StoreError::DuplicateName(name) => SubmitError::Conflict(name),
            other => SubmitError::Store(other),
        })?;

        if let Err(e) = save_bundle(&self.models_dir, &entry.model_id, &bundle) {
            // The entry exists but its job record does not; close it out
            // rather than leave an unservable pending row.
            let _ = self
                .registry
                .commit_status(&entry.model_id, ModelStatus::Failed);
            return Err(e.into());
        }

        info!(
            model_id = %entry.model_id,
            model_name = %bundle.model_name,
            "submission accepted, dispatching vote"
        );

        self.dispatch(entry.model_id.clone(), bundle);

        Ok(SubmissionReceipt {
            model_id: entry.model_id,
            status: "voting".to_string(),
        })
    }

    // One cooperative task per proposal; a slow poll never blocks new
    // submissions.
    fn dispatch(&self, model_id: String, bundle: ModelBundle) {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            match coordinator.run(&model_id, &bundle).await {
                Ok(status) => info!(model_id = %model_id, status = %status, "vote job finished"),
                Err(e) => error!(model_id = %model_id, error = %e, "vote job aborted"),
            }
        });
    }

    /// Re-dispatch vote jobs for entries left pending by a previous
    /// process. Returns how many jobs were resumed.
    pub fn resume_pending(&self) -> Result<usize, StoreError> {
        let pending = self.registry.list_by_status(ModelStatus::Pending)?;
        let mut resumed = 0;

        for entry in pending {
            match load_bundle(&self.models_dir, &entry.model_id) {
                Ok(bundle) => {
                    info!(model_id = %entry.model_id, "resuming interrupted vote");
                    self.dispatch(entry.model_id.clone(), bundle);
                    resumed += 1;
                }
                Err(e) => {
                    // Without its bundle the job can never finalize; close
                    // the entry so the name is not reserved forever.
                    error!(model_id = %entry.model_id, error = %e, "bundle lost, entry failed");
                    let _ = self
                        .registry
                        .commit_status(&entry.model_id, ModelStatus::Failed);
                }
            }
        }

        Ok(resumed)
    }

    /// Latest committed state for a model id.
    pub fn status_by_id(&self, model_id: &str) -> Result<RegistryEntry, QueryError> {
        self.registry
            .get(model_id)?
            .ok_or_else(|| QueryError::NotFound(model_id.to_string()))
    }

    /// Latest committed state for a model name.
    pub fn status_by_name(&self, model_name: &str) -> Result<RegistryEntry, QueryError> {
        self.registry
            .get_by_name(model_name)?
            .ok_or_else(|| QueryError::NotFound(model_name.to_string()))
    }

    /// Download the three published snapshots of an approved model as one
    /// zip archive.
    pub async fn fetch_artifacts(&self, model_id: &str) -> Result<Vec<u8>, QueryError> {
        let entry = self.status_by_id(model_id)?;

        if entry.status != ModelStatus::Approved {
            return Err(QueryError::NotApproved {
                model_id: entry.model_id,
                status: entry.status,
            });
        }

        // Approved entries always carry all three refs; treat a hole as
        // not-found rather than panic.
        let (Some(teacher_ref), Some(student_ref), Some(global_ref)) = (
            entry.teacher_model_ref.as_deref(),
            entry.student_model_ref.as_deref(),
            entry.global_model_ref.as_deref(),
        ) else {
            warn!(model_id = %entry.model_id, "approved entry with missing refs");
            return Err(QueryError::NotFound(entry.model_id));
        };

        let teacher = self.storage.get(teacher_ref).await?;
        let student = self.storage.get(student_ref).await?;
        let global = self.storage.get(global_ref).await?;

        Ok(archive::package_artifacts(
            &entry.model_name,
            &teacher,
            &student,
            &global,
        )?)
    }
}

fn bundle_path(models_dir: &Path, model_id: &str) -> PathBuf {
    models_dir.join(format!("{model_id}.json"))
}

/// Persist a bundle as the durable record for its vote job.
pub fn save_bundle(
    models_dir: &Path,
    model_id: &str,
    bundle: &ModelBundle,
) -> std::io::Result<()> {
    std::fs::create_dir_all(models_dir)?;
    let bytes = serde_json::to_vec(bundle).map_err(std::io::Error::other)?;
    std::fs::write(bundle_path(models_dir, model_id), bytes)
}

/// Load a previously persisted bundle.
pub fn load_bundle(models_dir: &Path, model_id: &str) -> std::io::Result<ModelBundle> {
    let bytes = std::fs::read(bundle_path(models_dir, model_id))?;
    serde_json::from_slice(&bytes).map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParameterSet, Tensor, TOKEN_EMBEDDING_KEY};

    fn bundle(name: &str) -> ModelBundle {
        let mut params = ParameterSet::new();
        params.insert(
            TOKEN_EMBEDDING_KEY,
            Tensor::new(vec![2, 2], vec![1.0; 4]).unwrap(),
        );
        ModelBundle::new(
            name,
            "ner",
            LanguageModel::new(params),
            Tokenizer::from_tokens(["a", "b"]),
        )
    }

    #[test]
    fn test_bundle_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let original = bundle("m1");

        save_bundle(dir.path(), "id-1", &original).unwrap();
        let loaded = load_bundle(dir.path(), "id-1").unwrap();

        assert_eq!(loaded.model_name, "m1");
        assert_eq!(loaded.tokenizer.vocab_size(), 2);
        assert_eq!(loaded.model.embedding_rows(), Some(2));
    }

    #[test]
    fn test_load_missing_bundle_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_bundle(dir.path(), "nope").is_err());
    }
}
