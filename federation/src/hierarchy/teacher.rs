//! Teacher registry: per-contributor storage keyed by (task, model_name).
//!
//! Nothing is merged here — each contributor's model and tokenizer are
//! stored verbatim so provenance survives aggregation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{LanguageModel, Tokenizer};

use super::{HierarchyError, ModelPart};

/// One contributor's slot under a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeacherEntry {
    pub model: Option<LanguageModel>,
    pub tokenizer: Option<Tokenizer>,
}

impl TeacherEntry {
    fn set(&mut self, part: ModelPart) {
        match part {
            ModelPart::Model(model) => self.model = Some(model),
            ModelPart::Tokenizer(tokenizer) => self.tokenizer = Some(tokenizer),
        }
    }
}

/// Two-level mapping: task → model_name → {model, tokenizer}.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeacherRegistry {
    tasks: HashMap<String, HashMap<String, TeacherEntry>>,
}

impl TeacherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one part under (task, model_name), creating buckets as needed.
    /// Later writes of the same kind overwrite; the other kind is untouched.
    pub fn add(&mut self, task: &str, model_name: &str, part: ModelPart) {
        self.tasks
            .entry(task.to_string())
            .or_default()
            .entry(model_name.to_string())
            .or_default()
            .set(part);
    }

    pub fn get(&self, task: &str, model_name: &str) -> Option<&TeacherEntry> {
        self.tasks.get(task)?.get(model_name)
    }

    /// Defined-or-error lookup.
    pub fn lookup(&self, task: &str, model_name: &str) -> Result<&TeacherEntry, HierarchyError> {
        let entries = self
            .tasks
            .get(task)
            .ok_or_else(|| HierarchyError::UnknownTask(task.to_string()))?;
        entries
            .get(model_name)
            .ok_or_else(|| HierarchyError::UnknownModel {
                task: task.to_string(),
                model: model_name.to_string(),
            })
    }

    pub fn tasks(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }

    pub fn models_for(&self, task: &str) -> Option<impl Iterator<Item = &String>> {
        Some(self.tasks.get(task)?.keys())
    }
}
