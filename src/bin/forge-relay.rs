//! CLI binary for the job relay.
//!
//! Browsers cannot post translation jobs to the derivative service directly;
//! run this next to the page that hosts the viewer and point
//! `FORGE_RELAY_URL` at it.

use anyhow::{Context, Result};
use clap::Parser;
use forge2view::relay::{self, RelayConfig};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// CORS relay for translation job submission.
#[derive(Parser, Debug)]
#[command(name = "forge-relay", version, about = "CORS relay for translation job submission")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "FORGE_RELAY_BIND", default_value = "127.0.0.1:3001")]
    bind: SocketAddr,

    /// Job endpoint requests are forwarded to.
    #[arg(long, env = "FORGE_RELAY_UPSTREAM")]
    upstream_url: Option<String>,

    /// Allowed CORS origin; repeat for several. None = any origin.
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Upstream request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = RelayConfig {
        allowed_origins: cli.allow_origins,
        upstream_timeout_secs: cli.timeout,
        ..RelayConfig::default()
    };
    if let Some(url) = cli.upstream_url {
        config.upstream_job_url = url;
    }

    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    relay::serve(listener, config)
        .await
        .context("Relay stopped")?;
    Ok(())
}
