//! Merge algorithms applied when an accepted contribution is folded into
//! an aggregate: TIES parameter merging and vocabulary superset merging.

mod ties;
mod vocab;

pub use ties::{ties_merge, DEFAULT_TIES_THRESHOLD};
pub use vocab::merge_vocabularies;

use crate::model::ModelError;

/// Error type for merge operations
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("shape mismatch for '{key}': {a:?} vs {b:?}")]
    ShapeMismatch {
        key: String,
        a: Vec<usize>,
        b: Vec<usize>,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;
