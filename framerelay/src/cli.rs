//! Command-line flags for the server and client binaries
//!
//! Every flag is optional and overrides the value from `--config` (or the
//! default). Flags can also be set through `FRAMERELAY_*` environment
//! variables.

use crate::config::{ClientConfig, ServerConfig};
use clap::Parser;
use framerelay_core::RelayResult;
use framerelay_media::TransformKind;
use std::path::PathBuf;

/// FrameRelay server
///
/// Accepts WebRTC offers on POST /offer and sends each client's video back
/// through a frame transform.
#[derive(Parser, Debug)]
#[command(name = "framerelay-server", version, about, long_about = None)]
pub struct ServerArgs {
    /// TOML configuration file
    #[arg(short, long, env = "FRAMERELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "FRAMERELAY_HOST")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "FRAMERELAY_PORT")]
    pub port: Option<u16>,

    /// Transform applied to relayed video
    #[arg(short, long, value_enum, env = "FRAMERELAY_TRANSFORM")]
    pub transform: Option<TransformKind>,

    /// STUN/TURN servers (comma-separated)
    #[arg(long, value_delimiter = ',', env = "FRAMERELAY_ICE_SERVERS")]
    pub ice_servers: Option<Vec<String>>,

    /// Seconds between statistics log lines
    #[arg(long, env = "FRAMERELAY_STATS_INTERVAL")]
    pub stats_interval: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "FRAMERELAY_LOG")]
    pub log: String,
}

impl ServerArgs {
    /// Load the configuration file, if any, and apply flag overrides
    pub fn into_config(self) -> RelayResult<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(transform) = self.transform {
            config.transform = transform;
        }
        if let Some(ice_servers) = self.ice_servers {
            config.ice_servers = ice_servers;
        }
        if let Some(secs) = self.stats_interval {
            config.stats_interval_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

/// FrameRelay client
///
/// Sends the local camera to a relay server and shows the returned video.
#[derive(Parser, Debug)]
#[command(name = "framerelay-client", version, about, long_about = None)]
pub struct ClientArgs {
    /// TOML configuration file
    #[arg(short, long, env = "FRAMERELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server host or base URL
    #[arg(short, long, env = "FRAMERELAY_SERVER")]
    pub server: Option<String>,

    /// Server port
    #[arg(short, long, env = "FRAMERELAY_PORT")]
    pub port: Option<u16>,

    /// Camera index
    #[arg(long, env = "FRAMERELAY_CAMERA")]
    pub camera: Option<u32>,

    /// Capture width
    #[arg(long, env = "FRAMERELAY_WIDTH")]
    pub width: Option<u32>,

    /// Capture height
    #[arg(long, env = "FRAMERELAY_HEIGHT")]
    pub height: Option<u32>,

    /// Capture frames per second
    #[arg(long, env = "FRAMERELAY_FRAMERATE")]
    pub framerate: Option<u32>,

    /// Send a synthetic test pattern instead of the camera
    #[arg(long, env = "FRAMERELAY_TEST_PATTERN")]
    pub test_pattern: bool,

    /// Transform applied to received video before display
    #[arg(long, value_enum, env = "FRAMERELAY_DISPLAY_TRANSFORM")]
    pub display_transform: Option<TransformKind>,

    /// Save received frames as PNG into this directory
    #[arg(long, env = "FRAMERELAY_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Save one out of this many received frames
    #[arg(long, env = "FRAMERELAY_SNAPSHOT_EVERY")]
    pub snapshot_every: Option<u64>,

    /// STUN/TURN servers (comma-separated)
    #[arg(long, value_delimiter = ',', env = "FRAMERELAY_ICE_SERVERS")]
    pub ice_servers: Option<Vec<String>>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "FRAMERELAY_LOG")]
    pub log: String,
}

impl ClientArgs {
    /// Load the configuration file, if any, and apply flag overrides
    pub fn into_config(self) -> RelayResult<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(camera) = self.camera {
            config.camera_index = camera;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(framerate) = self.framerate {
            config.framerate = framerate;
        }
        if self.test_pattern {
            config.test_pattern = true;
        }
        if let Some(transform) = self.display_transform {
            config.display_transform = transform;
        }
        if let Some(dir) = self.snapshot_dir {
            config.snapshot_dir = Some(dir);
        }
        if let Some(every) = self.snapshot_every {
            config.snapshot_every = every;
        }
        if let Some(ice_servers) = self.ice_servers {
            config.ice_servers = ice_servers;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_flags_override_defaults() {
        let args = ServerArgs::try_parse_from([
            "framerelay-server",
            "--port",
            "9001",
            "--transform",
            "grayscale",
            "--ice-servers",
            "stun:a:3478,stun:b:3478",
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.transform, TransformKind::Grayscale);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_client_flags() {
        let args = ClientArgs::try_parse_from([
            "framerelay-client",
            "--server",
            "relay.local",
            "--test-pattern",
            "--display-transform",
            "flip",
            "--width",
            "320",
            "--height",
            "240",
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.server_url(), "http://relay.local:8080");
        assert!(config.test_pattern);
        assert_eq!(config.display_transform, TransformKind::Flip);
        assert_eq!((config.width, config.height), (320, 240));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args =
            ClientArgs::try_parse_from(["framerelay-client", "--framerate", "0"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_unknown_transform_flag() {
        assert!(ServerArgs::try_parse_from(["framerelay-server", "--transform", "sepia"]).is_err());
    }
}
