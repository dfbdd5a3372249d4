//! # FrameRelay Signaling
//!
//! Single-exchange HTTP signaling: the client POSTs its SDP offer as JSON to
//! `/offer` and applies the answer it gets back. The server side negotiates a
//! peer connection per offer and relays the inbound video back to the same
//! peer through a frame transform.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod lifecycle;
pub mod protocol;
pub mod server;

// Re-export main types
pub use client::{RelayClient, RelayClientConfig, SignalingClient, DEFAULT_SIGNALING_TIMEOUT};
pub use lifecycle::close_on_failure;
pub use protocol::{is_json_content_type, OfferRejection, OFFER_PATH};
pub use server::SignalingServer;
