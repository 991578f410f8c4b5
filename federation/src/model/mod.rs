//! Core model data types: tensors, parameter collections, tokenizer
//! vocabularies, and the submitted model bundle.
//!
//! Tensors are opaque shaped `f32` buffers; the only structural operation
//! the pipeline performs on a model is the token-embedding resize that
//! tracks vocabulary growth.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameter key of the token-embedding table inside a model.
///
/// Submitted bundles must carry a 2-D tensor under this key; the resize
/// invariant keeps its row count equal to the tokenizer vocabulary size.
pub const TOKEN_EMBEDDING_KEY: &str = "token_embedding.weight";

/// Error type for model structure operations
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("tensor data length {got} does not match shape {shape:?} ({want} elements)")]
    DataLength {
        shape: Vec<usize>,
        want: usize,
        got: usize,
    },

    #[error("model has no '{0}' tensor")]
    MissingEmbedding(&'static str),

    #[error("embedding tensor must be 2-dimensional, got shape {0:?}")]
    BadEmbeddingRank(Vec<usize>),
}

/// Result type for model structure operations
pub type ModelResult<T> = Result<T, ModelError>;

/// A dense tensor: a shape and a row-major `f32` buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that the buffer matches the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> ModelResult<Self> {
        let want: usize = shape.iter().product();
        if data.len() != want {
            return Err(ModelError::DataLength {
                shape,
                want,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Zero-filled tensor of the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    pub fn same_shape(&self, other: &Tensor) -> bool {
        self.shape == other.shape
    }

    /// Mean absolute element-wise difference. Caller guarantees equal shapes.
    pub fn mean_abs_diff(&self, other: &Tensor) -> f64 {
        debug_assert!(self.same_shape(other));
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs() as f64)
            .sum();
        sum / self.data.len() as f64
    }
}

/// A named collection of tensors.
///
/// Backed by a `BTreeMap` so iteration order is deterministic; merge
/// results are reproducible across runs for identical inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    tensors: BTreeMap<String, Tensor>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(key.into(), tensor);
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.tensors.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Tensor> {
        self.tensors.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.tensors.keys()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl FromIterator<(String, Tensor)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

/// A language model as the pipeline sees it: a parameter set with a
/// token-embedding table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModel {
    pub params: ParameterSet,
}

impl LanguageModel {
    pub fn new(params: ParameterSet) -> Self {
        Self { params }
    }

    /// Row count of the token-embedding table, if present and 2-D.
    pub fn embedding_rows(&self) -> Option<usize> {
        let embedding = self.params.get(TOKEN_EMBEDDING_KEY)?;
        match embedding.shape.as_slice() {
            [rows, _] => Some(*rows),
            _ => None,
        }
    }

    /// Resize the token-embedding table to `vocab_size` rows.
    ///
    /// Existing rows are preserved; new rows are zero-initialized. A model
    /// without a 2-D embedding table is structurally incompatible and the
    /// resize fails.
    pub fn resize_token_embeddings(&mut self, vocab_size: usize) -> ModelResult<()> {
        let embedding = self
            .params
            .get_mut(TOKEN_EMBEDDING_KEY)
            .ok_or(ModelError::MissingEmbedding(TOKEN_EMBEDDING_KEY))?;

        let (rows, dim) = match embedding.shape.as_slice() {
            [rows, dim] => (*rows, *dim),
            other => return Err(ModelError::BadEmbeddingRank(other.to_vec())),
        };

        if rows == vocab_size {
            return Ok(());
        }

        embedding.data.resize(vocab_size * dim, 0.0);
        embedding.shape = vec![vocab_size, dim];
        Ok(())
    }
}

/// A tokenizer vocabulary: ordered token surface forms with stable ids.
///
/// Token ids are positions in the token list; appending never disturbs
/// existing assignments. Serializes as the bare token list; the lookup
/// index is rebuilt on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tokenizer {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl From<Vec<String>> for Tokenizer {
    fn from(tokens: Vec<String>) -> Self {
        let mut tokenizer = Self::new();
        for token in tokens {
            tokenizer.push(token);
        }
        tokenizer
    }
}

impl From<Tokenizer> for Vec<String> {
    fn from(tokenizer: Tokenizer) -> Self {
        tokenizer.tokens
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut tokenizer = Self::new();
        for token in tokens {
            tokenizer.push(token.into());
        }
        tokenizer
    }

    fn push(&mut self, token: String) {
        if !self.index.contains_key(&token) {
            self.index.insert(token.clone(), self.tokens.len() as u32);
            self.tokens.push(token);
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.tokens.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Append tokens not already in the vocabulary. Returns how many were
    /// actually added; ids are allocated in append order.
    pub fn add_tokens(&mut self, tokens: &[String]) -> usize {
        let before = self.tokens.len();
        for token in tokens {
            self.push(token.clone());
        }
        self.tokens.len() - before
    }
}

/// A submitted model bundle, immutable once accepted into a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model_name: String,
    pub task_label: String,
    pub model: LanguageModel,
    pub tokenizer: Tokenizer,
    pub submitted_at: DateTime<Utc>,
}

impl ModelBundle {
    pub fn new(
        model_name: impl Into<String>,
        task_label: impl Into<String>,
        model: LanguageModel,
        tokenizer: Tokenizer,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            task_label: task_label.into(),
            model,
            tokenizer,
            submitted_at: Utc::now(),
        }
    }
}
