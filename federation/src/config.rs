//! Runtime configuration for the federation daemon.
//!
//! Defaults come from the environment; a TOML file and CLI flags can
//! override them in the binary.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::merge::DEFAULT_TIES_THRESHOLD;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Configuration for the voting-gated merge pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Chat rooms that receive proposals and contribute votes
    pub voting_rooms: Vec<String>,

    /// Length of the voting window in seconds
    pub voting_duration_secs: u64,

    /// IPFS HTTP API endpoint
    pub ipfs_api_url: String,

    /// Ledger minting service endpoint
    pub ledger_mint_url: String,

    /// Chat homeserver base URL
    pub chat_homeserver: String,

    /// Chat access token
    pub chat_access_token: String,

    /// Directory holding pending bundle files, keyed by model id
    pub models_dir: PathBuf,

    /// TIES noise threshold
    pub ties_threshold: f64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            voting_rooms: std::env::var("FEDERATION_VOTING_ROOMS")
                .map(|rooms| {
                    rooms
                        .split(',')
                        .map(|room| room.trim().to_string())
                        .filter(|room| !room.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            voting_duration_secs: std::env::var("FEDERATION_VOTING_DURATION_SECS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(300),
            ipfs_api_url: std::env::var("FEDERATION_IPFS_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            ledger_mint_url: std::env::var("FEDERATION_LEDGER_MINT_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8090/mint".to_string()),
            chat_homeserver: std::env::var("FEDERATION_CHAT_HOMESERVER")
                .unwrap_or_else(|_| "http://127.0.0.1:8008".to_string()),
            chat_access_token: std::env::var("FEDERATION_CHAT_ACCESS_TOKEN").unwrap_or_default(),
            models_dir: std::env::var("FEDERATION_MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./models")),
            ties_threshold: DEFAULT_TIES_THRESHOLD,
        }
    }
}

impl FederationConfig {
    /// Load from a TOML file, with env-var defaults for missing keys.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn voting_window(&self) -> Duration {
        Duration::from_secs(self.voting_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_usable() {
        let config = FederationConfig::default();
        assert_eq!(config.voting_window(), Duration::from_secs(300));
        assert_eq!(config.ties_threshold, DEFAULT_TIES_THRESHOLD);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "voting_duration_secs = 10\nvoting_rooms = [\"!a:example.org\"]"
        )
        .unwrap();

        let config = FederationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.voting_duration_secs, 10);
        assert_eq!(config.voting_rooms, vec!["!a:example.org".to_string()]);
        // Unspecified key falls back to the default.
        assert_eq!(config.ties_threshold, DEFAULT_TIES_THRESHOLD);
    }
}
