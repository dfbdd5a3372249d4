//! WebRTC engine construction
//!
//! Both sides build their engine API from an [`EngineConfig`]. Video is
//! restricted to H.264 so every peer connection negotiates the one codec the
//! media pipeline can decode and re-encode.

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::RTCPFeedback;

/// Default public STUN server
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// RTP clock rate for video
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Default time allowed for ICE candidate gathering
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by every peer connection a process creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,
    /// Upper bound on ICE candidate gathering
    #[serde(with = "duration_ms")]
    pub gather_timeout: Duration,
    /// Offer loopback host candidates, for same-host peers
    #[serde(default)]
    pub loopback_candidates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            gather_timeout: DEFAULT_GATHER_TIMEOUT,
            loopback_candidates: false,
        }
    }
}

impl EngineConfig {
    /// Configuration with no ICE servers, host and loopback candidates only
    pub fn local_only() -> Self {
        Self {
            ice_servers: Vec::new(),
            loopback_candidates: true,
            ..Self::default()
        }
    }

    /// Build the engine API with the H.264 media engine and default interceptors
    pub fn build_api(&self) -> RelayResult<API> {
        let mut media_engine = MediaEngine::default();
        for params in h264_codecs() {
            media_engine
                .register_codec(params, RTPCodecType::Video)
                .map_err(|e| RelayError::engine("register codec", e))?;
        }

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| RelayError::engine("register interceptors", e))?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_include_loopback_candidate(self.loopback_candidates);

        Ok(APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build())
    }

    /// Peer connection configuration carrying the ICE servers
    pub fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

/// Codec capability used for outbound video tracks
pub fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_owned(),
        clock_rate: VIDEO_CLOCK_RATE,
        channels: 0,
        sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
            .to_owned(),
        rtcp_feedback: video_feedback(),
    }
}

fn video_feedback() -> Vec<RTCPFeedback> {
    vec![
        RTCPFeedback {
            typ: "goog-remb".to_owned(),
            parameter: String::new(),
        },
        RTCPFeedback {
            typ: "ccm".to_owned(),
            parameter: "fir".to_owned(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: String::new(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: "pli".to_owned(),
        },
    ]
}

fn h264_codecs() -> Vec<RTCRtpCodecParameters> {
    let profiles = [
        (102, "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f"),
        (127, "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42001f"),
        (125, "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"),
        (108, "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42e01f"),
    ];

    profiles
        .iter()
        .map(|(payload_type, fmtp)| RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: VIDEO_CLOCK_RATE,
                channels: 0,
                sdp_fmtp_line: (*fmtp).to_owned(),
                rtcp_feedback: video_feedback(),
            },
            payload_type: *payload_type,
            ..Default::default()
        })
        .collect()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_public_stun() {
        let config = EngineConfig::default();
        assert_eq!(config.ice_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert_eq!(config.gather_timeout, Duration::from_secs(10));
        assert_eq!(config.rtc_configuration().ice_servers.len(), 1);
    }

    #[test]
    fn test_local_only_has_no_ice_servers() {
        let config = EngineConfig::local_only();
        assert!(config.rtc_configuration().ice_servers.is_empty());
    }

    #[test]
    fn test_only_h264_registered() {
        let codecs = h264_codecs();
        assert_eq!(codecs.len(), 4);
        assert!(codecs
            .iter()
            .all(|c| c.capability.mime_type == MIME_TYPE_H264 && c.capability.clock_rate == 90_000));
    }

    #[test]
    fn test_build_api() {
        assert!(EngineConfig::local_only().build_api().is_ok());
    }

    #[test]
    fn test_config_serde_in_millis() {
        let json = serde_json::to_string(&EngineConfig::local_only()).unwrap();
        assert!(json.contains("\"gather_timeout\":10000"));
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EngineConfig::local_only());
    }
}
