//! Immutable-ledger minting collaborator.
//!
//! `mint` blocks until the record is durably included and returns its
//! token id. There is no retry here: a mint failure is fatal for the
//! finalize attempt that issued it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// Error type for ledger operations
#[derive(Debug, thiserror::Error)]
pub enum MintError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("ledger API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("mint rejected: {0}")]
    Rejected(String),
}

/// Result type for ledger operations
pub type MintResult<T> = Result<T, MintError>;

/// Shared reference to a ledger client
pub type SharedLedgerClient = Arc<dyn LedgerClient>;

/// Abstract minting interface: metadata in, durable token id out.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn mint(&self, metadata: serde_json::Value) -> MintResult<String>;
}

/// HTTP client for a ledger minting service.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    mint_url: String,
}

impl HttpLedgerClient {
    pub fn new(mint_url: impl Into<String>) -> MintResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| MintError::Http(e.to_string()))?;

        Ok(Self {
            http,
            mint_url: mint_url.into(),
        })
    }

    pub fn shared(self) -> SharedLedgerClient {
        Arc::new(self)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn mint(&self, metadata: serde_json::Value) -> MintResult<String> {
        #[derive(Deserialize)]
        struct MintResponse {
            nft_id: String,
        }

        let response = self
            .http
            .post(&self.mint_url)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| MintError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MintError::Api { status, body });
        }

        let minted: MintResponse = response
            .json()
            .await
            .map_err(|e| MintError::Http(e.to_string()))?;

        info!(nft_id = %minted.nft_id, "ledger record minted");
        Ok(minted.nft_id)
    }
}

/// In-memory ledger issuing sequential token ids and recording metadata.
#[derive(Default)]
pub struct MemoryLedger {
    minted: Mutex<Vec<serde_json::Value>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedLedgerClient {
        Arc::new(self)
    }

    pub fn minted_count(&self) -> usize {
        self.minted.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn mint(&self, metadata: serde_json::Value) -> MintResult<String> {
        let mut minted = self.minted.lock().unwrap();
        minted.push(metadata);
        Ok(format!("0x{:064x}", minted.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_ledger_issues_distinct_ids() {
        let ledger = MemoryLedger::new();
        let a = ledger.mint(serde_json::json!({"n": 1})).await.unwrap();
        let b = ledger.mint(serde_json::json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(ledger.minted_count(), 2);
    }
}
