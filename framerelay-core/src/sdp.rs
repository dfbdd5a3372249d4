//! Session description messages exchanged during signaling
//!
//! The wire shape is the browser-compatible `{"sdp": "...", "type": "offer"}`
//! object. Conversion to and from the engine's own description type lives
//! here so the signaling crates never touch engine SDP types directly.

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Initial proposal from the calling side
    Offer,
    /// Provisional answer
    Pranswer,
    /// Final answer from the called side
    Answer,
    /// Revert to the last stable description
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdpType::Offer => "offer",
            SdpType::Pranswer => "pranswer",
            SdpType::Answer => "answer",
            SdpType::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Signaling message carrying one session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// SDP text
    pub sdp: String,
    /// Description kind, serialized as `type`
    #[serde(rename = "type")]
    pub kind: SdpType,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpType::Offer,
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpType::Answer,
        }
    }

    /// Parse a signaling message from a JSON body
    pub fn from_json(body: &[u8]) -> RelayResult<Self> {
        let desc: SessionDescription = serde_json::from_slice(body)?;
        Ok(desc)
    }

    /// Serialize to the JSON wire shape
    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Require a specific description kind with non-empty SDP
    pub fn expect_kind(&self, kind: SdpType) -> RelayResult<()> {
        if self.kind != kind {
            return Err(RelayError::InvalidSessionDescription {
                reason: format!("expected {}, got {}", kind, self.kind),
            });
        }
        if self.sdp.trim().is_empty() {
            return Err(RelayError::InvalidSessionDescription {
                reason: format!("{} has empty sdp", self.kind),
            });
        }
        Ok(())
    }

    /// Convert into the engine description, parsing the SDP text
    pub fn to_rtc(&self) -> RelayResult<RTCSessionDescription> {
        let sdp = self.sdp.clone();
        let parsed = match self.kind {
            SdpType::Offer => RTCSessionDescription::offer(sdp),
            SdpType::Answer => RTCSessionDescription::answer(sdp),
            SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
            SdpType::Rollback => {
                return Err(RelayError::InvalidSessionDescription {
                    reason: "rollback descriptions are not supported".to_string(),
                })
            }
        };
        parsed.map_err(|e| RelayError::InvalidSessionDescription {
            reason: e.to_string(),
        })
    }

    /// Convert from the engine description
    pub fn from_rtc(desc: &RTCSessionDescription) -> RelayResult<Self> {
        let kind = match desc.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            RTCSdpType::Pranswer => SdpType::Pranswer,
            RTCSdpType::Rollback => SdpType::Rollback,
            other => {
                return Err(RelayError::InvalidSessionDescription {
                    reason: format!("unsupported description type {}", other),
                })
            }
        };
        Ok(Self {
            sdp: desc.sdp.clone(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_uses_type_field() {
        let desc = SessionDescription::offer("v=0\r\n");
        let json = desc.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""));
        assert!(json.contains("\"sdp\":\"v=0\\r\\n\""));
    }

    #[test]
    fn test_parse_answer_from_browser_json() {
        let desc = SessionDescription::from_json(br#"{"sdp":"v=0","type":"answer"}"#).unwrap();
        assert_eq!(desc.kind, SdpType::Answer);
        assert_eq!(desc.sdp, "v=0");
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = SessionDescription::from_json(b"{\"sdp\": 1").unwrap_err();
        assert_eq!(err.error_code(), "JSON_ERROR");

        let err = SessionDescription::from_json(br#"{"sdp":"v=0","type":"bogus"}"#).unwrap_err();
        assert_eq!(err.error_code(), "JSON_ERROR");

        let err = SessionDescription::from_json(br#"{"type":"offer"}"#).unwrap_err();
        assert_eq!(err.error_code(), "JSON_ERROR");
    }

    #[test]
    fn test_expect_kind() {
        let desc = SessionDescription::answer("v=0");
        assert!(desc.expect_kind(SdpType::Answer).is_ok());
        assert!(desc.expect_kind(SdpType::Offer).is_err());
        assert!(SessionDescription::offer("  ")
            .expect_kind(SdpType::Offer)
            .is_err());
    }

    #[test]
    fn test_rollback_not_convertible() {
        let desc = SessionDescription {
            sdp: String::new(),
            kind: SdpType::Rollback,
        };
        assert!(desc.to_rtc().is_err());
    }

    #[test]
    fn test_unparsable_sdp_rejected() {
        let err = SessionDescription::offer("this is not sdp").to_rtc().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_SESSION_DESCRIPTION");
    }
}
