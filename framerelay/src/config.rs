//! Configuration types and defaults
//!
//! Both configurations deserialize from TOML with every field optional;
//! command-line flags are applied on top (see [`crate::cli`]).

use framerelay_core::{EngineConfig, RelayError, RelayResult, DEFAULT_STUN_SERVER};
use framerelay_media::{CaptureConfig, H264Config, TransformKind};
use framerelay_signaling::RelayClientConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_client_server() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_server_transform() -> TransformKind {
    TransformKind::Edges
}

fn default_ice_servers() -> Vec<String> {
    vec![DEFAULT_STUN_SERVER.to_string()]
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_stats_interval_secs() -> u64 {
    10
}

fn default_camera_index() -> u32 {
    0
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_framerate() -> u32 {
    30
}

fn default_snapshot_every() -> u64 {
    30
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> RelayResult<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| RelayError::Configuration {
        field: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn invalid(field: &str, reason: impl Into<String>) -> RelayError {
    RelayError::Configuration {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn engine_config(ice_servers: &[String], timeout_ms: u64, loopback: bool) -> EngineConfig {
    EngineConfig {
        ice_servers: ice_servers.to_vec(),
        gather_timeout: Duration::from_millis(timeout_ms),
        loopback_candidates: loopback,
    }
}

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Transform applied to relayed frames
    #[serde(default = "default_server_transform")]
    pub transform: TransformKind,
    /// STUN/TURN servers
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
    /// Offer loopback candidates
    #[serde(default)]
    pub loopback_candidates: bool,
    /// ICE gathering timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub ice_gathering_timeout_ms: u64,
    /// Seconds between statistics log lines
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
            transform: default_server_transform(),
            ice_servers: default_ice_servers(),
            loopback_candidates: false,
            ice_gathering_timeout_ms: default_timeout_ms(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        read_toml(path.as_ref())
    }

    /// Reject unusable settings
    pub fn validate(&self) -> RelayResult<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must not be zero"));
        }
        if self.ice_gathering_timeout_ms == 0 {
            return Err(invalid("ice_gathering_timeout_ms", "must be positive"));
        }
        if self.stats_interval_secs == 0 {
            return Err(invalid("stats_interval_secs", "must be positive"));
        }
        Ok(())
    }

    /// Resolve `host:port`
    pub async fn bind_addr(&self) -> RelayResult<SocketAddr> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| invalid("host", format!("{} did not resolve", self.host)))
    }

    /// Peer connection settings
    pub fn engine_config(&self) -> EngineConfig {
        engine_config(
            &self.ice_servers,
            self.ice_gathering_timeout_ms,
            self.loopback_candidates,
        )
    }

    /// Statistics interval
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Relay client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Signaling server host, or a full base URL
    #[serde(default = "default_client_server")]
    pub server: String,
    /// Signaling server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Camera index
    #[serde(default = "default_camera_index")]
    pub camera_index: u32,
    /// Capture width
    #[serde(default = "default_width")]
    pub width: u32,
    /// Capture height
    #[serde(default = "default_height")]
    pub height: u32,
    /// Capture frames per second
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    /// Send a synthetic test pattern instead of the camera
    #[serde(default)]
    pub test_pattern: bool,
    /// Transform applied to received frames before display
    #[serde(default)]
    pub display_transform: TransformKind,
    /// Write received frames as PNG into this directory
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    /// Save one out of this many received frames
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
    /// STUN/TURN servers
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
    /// Offer loopback candidates
    #[serde(default)]
    pub loopback_candidates: bool,
    /// ICE gathering timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub ice_gathering_timeout_ms: u64,
    /// Offer POST timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub signaling_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_client_server(),
            port: default_port(),
            camera_index: default_camera_index(),
            width: default_width(),
            height: default_height(),
            framerate: default_framerate(),
            test_pattern: false,
            display_transform: TransformKind::default(),
            snapshot_dir: None,
            snapshot_every: default_snapshot_every(),
            ice_servers: default_ice_servers(),
            loopback_candidates: false,
            ice_gathering_timeout_ms: default_timeout_ms(),
            signaling_timeout_ms: default_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        read_toml(path.as_ref())
    }

    /// Reject unusable settings
    pub fn validate(&self) -> RelayResult<()> {
        if self.server.trim().is_empty() {
            return Err(invalid("server", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must not be zero"));
        }
        self.capture_config()
            .validate()
            .map_err(|e| invalid("capture", e.to_string()))?;
        if self.snapshot_every == 0 {
            return Err(invalid("snapshot_every", "must be positive"));
        }
        if self.ice_gathering_timeout_ms == 0 {
            return Err(invalid("ice_gathering_timeout_ms", "must be positive"));
        }
        if self.signaling_timeout_ms == 0 {
            return Err(invalid("signaling_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    /// Base URL of the signaling server
    ///
    /// `server` is used as-is when it already carries a scheme.
    pub fn server_url(&self) -> String {
        if self.server.contains("://") {
            self.server.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", self.server, self.port)
        }
    }

    /// Capture device settings
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            camera_index: self.camera_index,
            width: self.width,
            height: self.height,
            framerate: self.framerate,
        }
    }

    /// Peer connection settings
    pub fn engine_config(&self) -> EngineConfig {
        engine_config(
            &self.ice_servers,
            self.ice_gathering_timeout_ms,
            self.loopback_candidates,
        )
    }

    /// Settings for the relay session
    pub fn relay_config(&self) -> RelayClientConfig {
        RelayClientConfig {
            server_url: self.server_url(),
            engine: self.engine_config(),
            signaling_timeout: Duration::from_millis(self.signaling_timeout_ms),
            encoder: H264Config {
                framerate: self.framerate,
                ..H264Config::default()
            },
            display_transform: self.display_transform.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.transform, TransformKind::Edges);
        assert_eq!(config.bind_addr().await.unwrap().port(), 8080);
        assert_eq!(config.engine_config().gather_timeout, Duration::from_secs(10));
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_bind_addr_resolves_hostname() {
        let config = ServerConfig {
            host: "localhost".to_string(),
            port: 9000,
            ..ServerConfig::default()
        };
        let addr = tokio_test::assert_ok!(config.bind_addr().await);
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn test_client_url() {
        let mut config = ClientConfig::default();
        assert_eq!(config.server_url(), "http://localhost:8080");
        config.server = "https://relay.example.com/".to_string();
        assert_eq!(config.server_url(), "https://relay.example.com");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ServerConfig = toml::from_str("port = 9000\ntransform = \"grayscale\"").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.transform, TransformKind::Grayscale);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.ice_servers, vec![DEFAULT_STUN_SERVER.to_string()]);

        let client: ClientConfig =
            toml::from_str("server = \"10.0.0.2\"\nsnapshot_dir = \"/tmp/frames\"").unwrap();
        assert_eq!(client.server_url(), "http://10.0.0.2:8080");
        assert_eq!(client.snapshot_dir, Some(PathBuf::from("/tmp/frames")));
        assert_eq!(client.framerate, 30);
    }

    #[test]
    fn test_client_validation() {
        let mut config = ClientConfig {
            width: 641,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
        config.width = 640;
        config.framerate = 0;
        assert!(config.validate().is_err());
        config.framerate = 30;
        config.signaling_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.signaling_timeout_ms = 500;
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_transform_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("transform = \"sepia\"");
        assert!(result.is_err());
    }
}
