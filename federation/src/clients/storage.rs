//! Content-addressed storage collaborator.
//!
//! The pipeline needs exactly `put(bytes) -> cid` and `get(cid) -> bytes`,
//! idempotent on identical input. `IpfsClient` speaks the IPFS HTTP API;
//! `MemoryContentStore` hashes content in process.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// A content address: hash-derived identifier for immutable stored bytes.
pub type Cid = String;

/// Error type for content store operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("storage API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("content not found: {0}")]
    NotFound(Cid),
}

/// Result type for content store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared reference to a content store
pub type SharedContentStore = Arc<dyn ContentStore>;

/// Abstract put/get over immutable content-addressed bytes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>) -> StorageResult<Cid>;

    async fn get(&self, cid: &str) -> StorageResult<Vec<u8>>;
}

/// IPFS HTTP API client (`/api/v0/add`, `/api/v0/cat`).
pub struct IpfsClient {
    http: reqwest::Client,
    api_url: String,
}

impl IpfsClient {
    pub fn new(api_url: impl Into<String>) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| StorageError::Http(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    pub fn shared(self) -> SharedContentStore {
        Arc::new(self)
    }
}

#[async_trait]
impl ContentStore for IpfsClient {
    async fn put(&self, bytes: Vec<u8>) -> StorageResult<Cid> {
        #[derive(Deserialize)]
        struct AddResponse {
            #[serde(rename = "Hash")]
            hash: String,
        }

        let part = reqwest::multipart::Part::bytes(bytes).file_name("artifact");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/api/v0/add", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        debug!(cid = %added.hash, "uploaded artifact");
        Ok(added.hash)
    }

    async fn get(&self, cid: &str) -> StorageResult<Vec<u8>> {
        let response = self
            .http
            .post(format!("{}/api/v0/cat", self.api_url))
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// In-memory content store. Addresses are derived from content, so `put`
/// is idempotent just like the real thing.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<Cid, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedContentStore {
        Arc::new(self)
    }

    fn address(bytes: &[u8]) -> Cid {
        let mut hasher = DefaultHasher::new();
        hasher.write(bytes);
        format!("mem-{:016x}", hasher.finish())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> StorageResult<Cid> {
        let cid = Self::address(&bytes);
        self.blobs.lock().unwrap().insert(cid.clone(), bytes);
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> StorageResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(cid.to_string()))
    }
}
