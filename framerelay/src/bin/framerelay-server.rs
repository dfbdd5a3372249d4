//! Relay server binary
//!
//! ```bash
//! framerelay-server --port 8080 --transform edges
//! framerelay-server --config server.toml
//! ```

use anyhow::Context;
use clap::Parser;
use framerelay::cli::ServerArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    framerelay::init_logging(&args.log).context("failed to initialize logging")?;

    let config = args.into_config().context("invalid server configuration")?;
    tracing::info!(
        "Starting relay server on {}:{} with transform {}",
        config.host,
        config.port,
        config.transform
    );

    framerelay::run_server(config, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, shutting down");
    })
    .await
    .context("relay server failed")?;
    Ok(())
}
