//! Global model: a single task-agnostic aggregation slot pooling every
//! accepted contribution.

use serde::{Deserialize, Serialize};

use crate::merge::MergeResult;

use super::{AggregateSlot, ModelPart};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalModel {
    slot: AggregateSlot,
}

impl GlobalModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, part: ModelPart, ties_threshold: f64) -> MergeResult<()> {
        self.slot.absorb(part, ties_threshold)
    }

    pub fn slot(&self) -> &AggregateSlot {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::DEFAULT_TIES_THRESHOLD;
    use crate::model::Tokenizer;

    #[test]
    fn test_pools_across_tasks() {
        let mut global = GlobalModel::new();
        global
            .add(ModelPart::Tokenizer(Tokenizer::from_tokens(["a", "b"])), DEFAULT_TIES_THRESHOLD)
            .unwrap();
        global
            .add(ModelPart::Tokenizer(Tokenizer::from_tokens(["b", "c"])), DEFAULT_TIES_THRESHOLD)
            .unwrap();

        let tokenizer = global.slot().tokenizer.as_ref().unwrap();
        assert_eq!(tokenizer.vocab_size(), 3);
    }
}
