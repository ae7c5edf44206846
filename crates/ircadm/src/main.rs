//! ircadm - administrative CLI for a self-hosted Ergo IRC network.
//!
//! Provisions NickServ accounts from Secret Manager credentials and resets
//! the account database.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ircadm::cli::Cli;
use ircadm::runner;
use ircadm::secrets::SecretManagerClient;
use ircadm::session::FixedPacing;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let action = cli.action();
    let cfg = cli.run_config();

    let store = SecretManagerClient::new()?;
    runner::run(&action, &cfg, &store, &FixedPacing).await?;
    Ok(())
}
