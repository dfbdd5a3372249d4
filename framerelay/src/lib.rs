//! # FrameRelay
//!
//! A minimal WebRTC video relay. The client captures a camera (or a synthetic
//! test pattern), negotiates a peer connection with the server over a single
//! HTTP `POST /offer` exchange and shows whatever video comes back. The
//! server sends every client's video back to it after running each frame
//! through a configurable transform (edge detection, grayscale, flip or
//! passthrough).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framerelay::{run_server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     run_server(config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use framerelay_core::{
    ConnectionRegistry, ConnectionState, EngineConfig, PeerConnectionHandle, RelayError,
    RelayResult, SdpType, SessionDescription,
};
pub use framerelay_diagnostics::{init_logging, StatsReporter};
pub use framerelay_media::{
    BgrImage, FrameAdapter, FrameSink, FrameSource, FrameTransform, MediaError, TransformKind,
    VideoFrame,
};
pub use framerelay_signaling::{RelayClient, RelayClientConfig, SignalingClient, SignalingServer};

// Public API modules
pub mod cli;
pub mod config;

// Re-export main API types
pub use config::{ClientConfig, ServerConfig};

use framerelay_media::{
    open_camera, CaptureStream, LoggingSink, SnapshotSink, TestPatternSource,
};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval of the client's display log line
const DISPLAY_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Run the relay server until `shutdown` resolves
///
/// All live connections are closed before this returns.
pub async fn run_server<F>(config: ServerConfig, shutdown: F) -> RelayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let server = SignalingServer::new(
        config.bind_addr().await?,
        config.engine_config(),
        config.transform.build(),
    );

    let cancel = CancellationToken::new();
    let reporter = StatsReporter::new("relay", server.adapter_stats())
        .with_registry(server.registry().clone())
        .start(config.stats_interval(), cancel.clone());

    let result = server.run(shutdown).await;
    cancel.cancel();
    let _ = reporter.await;
    tracing::info!("Relay server stopped");
    result
}

/// Open the configured capture source on its capture thread
pub async fn open_capture(config: &ClientConfig) -> RelayResult<CaptureStream> {
    let capture = config.capture_config();
    let test_pattern = config.test_pattern;
    let stream = CaptureStream::spawn(
        move || {
            if test_pattern {
                Ok(Box::new(TestPatternSource::new(capture.width, capture.height)?)
                    as Box<dyn FrameSource>)
            } else {
                open_camera(&capture)
            }
        },
        capture.framerate,
    )
    .await?;
    Ok(stream)
}

fn display_sink(config: &ClientConfig) -> RelayResult<Box<dyn FrameSink>> {
    match &config.snapshot_dir {
        Some(dir) => Ok(Box::new(SnapshotSink::new(dir, config.snapshot_every)?)),
        None => Ok(Box::new(LoggingSink::new("display", DISPLAY_LOG_INTERVAL))),
    }
}

/// Run the relay client until the connection ends or `shutdown` resolves
///
/// Returns the state the connection ended in. Capture and signaling
/// failures are returned as errors; no reconnect is attempted.
pub async fn run_client<F>(config: ClientConfig, shutdown: F) -> RelayResult<ConnectionState>
where
    F: Future<Output = ()> + Send,
{
    config.validate()?;
    let capture = open_capture(&config).await?;
    let sink = display_sink(&config)?;

    let mut client = RelayClient::new(config.relay_config())?;
    client.connect(capture, sink).await?;

    let state = tokio::select! {
        state = client.wait_closed() => {
            tracing::warn!("Connection ended: {}", state);
            state
        }
        _ = shutdown => {
            tracing::info!("Shutting down client");
            ConnectionState::Closed
        }
    };

    client.disconnect().await?;
    Ok(state)
}
