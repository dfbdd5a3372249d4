//! Relay client binary
//!
//! ```bash
//! framerelay-client --server localhost --port 8080
//! framerelay-client --test-pattern --snapshot-dir ./frames
//! ```

use anyhow::Context;
use clap::Parser;
use framerelay::cli::ClientArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();
    framerelay::init_logging(&args.log).context("failed to initialize logging")?;

    let config = args.into_config().context("invalid client configuration")?;
    let server_url = config.server_url();
    tracing::info!("Connecting to {}", server_url);

    let state = framerelay::run_client(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .with_context(|| format!("relay session with {} failed", server_url))?;

    if state == framerelay::ConnectionState::Failed {
        anyhow::bail!("connection to {} failed", server_url);
    }
    Ok(())
}
