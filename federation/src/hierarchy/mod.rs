//! The three aggregate model roles: Teacher keeps per-contributor
//! provenance, Student merges cumulatively per task, Global merges
//! cumulatively across all tasks.
//!
//! All three live in memory and are mutated by the coordinator during
//! finalize; `ModelHierarchy` supports clone snapshots so a failed
//! finalize can be rolled back completely.

mod global;
mod student;
mod teacher;

pub use global::GlobalModel;
pub use student::StudentRegistry;
pub use teacher::{TeacherEntry, TeacherRegistry};

use serde::{Deserialize, Serialize};

use crate::merge::{merge_vocabularies, ties_merge, MergeResult};
use crate::model::{LanguageModel, Tokenizer};

/// Error type for hierarchy lookups
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("unknown model '{model}' under task '{task}'")]
    UnknownModel { task: String, model: String },
}

/// One half of a contribution: the parameters or the tokenizer.
#[derive(Debug, Clone)]
pub enum ModelPart {
    Model(LanguageModel),
    Tokenizer(Tokenizer),
}

/// A cumulative {model, tokenizer} aggregation slot.
///
/// Shared by Student task entries and the Global model: an incoming part
/// merges into the slot when its counterpart of the same kind is already
/// present and is stored directly otherwise. The incumbent state is
/// always the TIES operand A. After every add where both halves are
/// present, the embedding table is resized to the vocabulary size.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateSlot {
    pub model: Option<LanguageModel>,
    pub tokenizer: Option<Tokenizer>,
}

impl AggregateSlot {
    pub fn absorb(&mut self, part: ModelPart, ties_threshold: f64) -> MergeResult<()> {
        match part {
            ModelPart::Tokenizer(incoming) => match self.tokenizer.as_mut() {
                Some(existing) => {
                    merge_vocabularies(existing, &incoming);
                }
                None => self.tokenizer = Some(incoming),
            },
            ModelPart::Model(incoming) => match self.model.as_mut() {
                Some(existing) => {
                    existing.params = ties_merge(&existing.params, &incoming.params, ties_threshold)?;
                }
                None => self.model = Some(incoming),
            },
        }

        // Vocabulary growth is monotonic; the embedding table must track
        // it after every merge, not just the first.
        if let (Some(model), Some(tokenizer)) = (self.model.as_mut(), self.tokenizer.as_ref()) {
            model.resize_token_embeddings(tokenizer.vocab_size())?;
        }

        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.model.is_some() && self.tokenizer.is_some()
    }
}

/// The full in-memory aggregate state mutated by finalize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelHierarchy {
    pub teacher: TeacherRegistry,
    pub student: StudentRegistry,
    pub global: GlobalModel,
}

impl ModelHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one accepted contribution into all three aggregates.
    pub fn absorb_bundle(
        &mut self,
        task: &str,
        model_name: &str,
        model: &LanguageModel,
        tokenizer: &Tokenizer,
        ties_threshold: f64,
    ) -> MergeResult<()> {
        self.teacher
            .add(task, model_name, ModelPart::Tokenizer(tokenizer.clone()));
        self.teacher
            .add(task, model_name, ModelPart::Model(model.clone()));

        self.student
            .add(task, ModelPart::Tokenizer(tokenizer.clone()), ties_threshold)?;
        self.student
            .add(task, ModelPart::Model(model.clone()), ties_threshold)?;

        self.global
            .add(ModelPart::Tokenizer(tokenizer.clone()), ties_threshold)?;
        self.global
            .add(ModelPart::Model(model.clone()), ties_threshold)?;

        Ok(())
    }

    /// Cheap full-state snapshot for rollback on finalize failure.
    pub fn snapshot(&self) -> ModelHierarchy {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: ModelHierarchy) {
        *self = snapshot;
    }
}
