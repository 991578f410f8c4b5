//! Student registry: one cumulative aggregation slot per task.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::merge::MergeResult;

use super::{AggregateSlot, ModelPart};

/// Mapping task → cumulative {model, tokenizer} aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentRegistry {
    tasks: HashMap<String, AggregateSlot>,
}

impl StudentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one part into the task's slot, creating the slot on first use.
    pub fn add(&mut self, task: &str, part: ModelPart, ties_threshold: f64) -> MergeResult<()> {
        self.tasks
            .entry(task.to_string())
            .or_default()
            .absorb(part, ties_threshold)
    }

    pub fn task(&self, task: &str) -> Option<&AggregateSlot> {
        self.tasks.get(task)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::DEFAULT_TIES_THRESHOLD;
    use crate::model::{LanguageModel, ParameterSet, Tensor, Tokenizer, TOKEN_EMBEDDING_KEY};

    fn model(rows: usize, fill: f32) -> LanguageModel {
        let mut params = ParameterSet::new();
        params.insert(
            TOKEN_EMBEDDING_KEY,
            Tensor::new(vec![rows, 2], vec![fill; rows * 2]).unwrap(),
        );
        LanguageModel::new(params)
    }

    #[test]
    fn test_tasks_accumulate_independently() {
        let mut registry = StudentRegistry::new();
        registry
            .add("ner", ModelPart::Tokenizer(Tokenizer::from_tokens(["a"])), DEFAULT_TIES_THRESHOLD)
            .unwrap();
        registry
            .add("qa", ModelPart::Tokenizer(Tokenizer::from_tokens(["x", "y"])), DEFAULT_TIES_THRESHOLD)
            .unwrap();

        assert_eq!(registry.task("ner").unwrap().tokenizer.as_ref().unwrap().vocab_size(), 1);
        assert_eq!(registry.task("qa").unwrap().tokenizer.as_ref().unwrap().vocab_size(), 2);
    }

    #[test]
    fn test_cumulative_merge_within_task() {
        let mut registry = StudentRegistry::new();
        registry
            .add("ner", ModelPart::Model(model(1, 1.0)), DEFAULT_TIES_THRESHOLD)
            .unwrap();
        registry
            .add("ner", ModelPart::Model(model(1, 3.0)), DEFAULT_TIES_THRESHOLD)
            .unwrap();

        // Agreeing signs average: (1 + 3) / 2.
        let slot = registry.task("ner").unwrap();
        let embedding = slot.model.as_ref().unwrap().params.get(TOKEN_EMBEDDING_KEY).unwrap();
        assert_eq!(embedding.data, vec![2.0, 2.0]);
    }
}
