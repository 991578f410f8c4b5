//! Federation daemon: wires the collaborators, resumes interrupted vote
//! jobs, and keeps the merge pipeline alive until interrupted.
//!
//! The HTTP submission surface lives in front of this process; the daemon
//! owns the registry, the in-memory hierarchy, and the background voting
//! tasks.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::RwLock;

use federation::clients::{HttpLedgerClient, IpfsClient, MatrixChatClient};
use federation::config::FederationConfig;
use federation::hierarchy::ModelHierarchy;
use federation::pipeline::SubmissionPipeline;
use federation::registry::MemoryRegistry;
use federation::voting::VotingCoordinator;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (env vars fill anything unset)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the models directory
    #[arg(long)]
    models_dir: Option<std::path::PathBuf>,

    /// Override the voting window in seconds
    #[arg(long)]
    voting_duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("federation=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match args.config {
        Some(path) => FederationConfig::from_file(path)?,
        None => FederationConfig::default(),
    };
    if let Some(dir) = args.models_dir {
        config.models_dir = dir;
    }
    if let Some(secs) = args.voting_duration_secs {
        config.voting_duration_secs = secs;
    }

    tracing::info!(
        rooms = config.voting_rooms.len(),
        window_secs = config.voting_duration_secs,
        models_dir = %config.models_dir.display(),
        "starting federation daemon"
    );

    let registry = MemoryRegistry::new().shared();
    let hierarchy = Arc::new(RwLock::new(ModelHierarchy::new()));
    let storage = IpfsClient::new(config.ipfs_api_url.clone())?.shared();
    let ledger = HttpLedgerClient::new(config.ledger_mint_url.clone())?.shared();
    let chat = MatrixChatClient::new(
        config.chat_homeserver.clone(),
        config.chat_access_token.clone(),
    )?
    .shared();

    let coordinator = VotingCoordinator::new(
        registry.clone(),
        hierarchy,
        storage.clone(),
        ledger,
        chat,
        config.clone(),
    )
    .shared();

    let pipeline = SubmissionPipeline::new(registry, coordinator, storage, config.models_dir);

    let resumed = pipeline.resume_pending()?;
    if resumed > 0 {
        tracing::info!(resumed, "resumed interrupted vote jobs");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}
