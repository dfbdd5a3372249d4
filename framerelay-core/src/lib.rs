//! # FrameRelay Core
//!
//! Peer connection plumbing shared by the relay client and server: the error
//! type, signaling session descriptions, engine construction, the peer
//! connection handle and the connection registry. ICE, DTLS/SRTP and RTP
//! transport are provided by the `webrtc` engine.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod peer;
pub mod registry;
pub mod sdp;

// Re-export main types
pub use engine::{h264_capability, EngineConfig, DEFAULT_STUN_SERVER, VIDEO_CLOCK_RATE};
pub use error::{RelayError, RelayResult};
pub use peer::{ConnectionId, ConnectionState, PeerConnectionHandle};
pub use registry::ConnectionRegistry;
pub use sdp::{SdpType, SessionDescription};

// Engine types that appear in public signatures
pub use webrtc;
