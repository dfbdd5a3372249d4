//! # FrameRelay Media
//!
//! Frame types, pixel conversion, frame transforms, the fail-open frame
//! adapter, H.264 coding and the media loops that move video between a
//! WebRTC track and a transform.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod capture;
pub mod codec;
pub mod convert;
pub mod display;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod relay;
pub mod transform;

// Re-export main types
pub use adapter::{AdapterSnapshot, AdapterStats, FrameAdapter};
#[cfg(feature = "camera")]
pub use capture::CameraSource;
pub use capture::{
    open_camera, CaptureConfig, CaptureStream, CapturedFrame, FrameSource, TestPatternSource,
};
pub use codec::{H264Config, H264Decoder, H264Encoder};
pub use convert::{bgr_to_i420, i420_to_bgr};
pub use display::{FrameSink, LoggingSink, SnapshotSink};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use frame::{BgrImage, TimeBase, VideoFrame};
pub use pipeline::{run_camera_sender, run_display_loop, run_processing_loop, LoopSummary};
pub use relay::{RelaySubscription, RtpSource, TrackRelay, DEFAULT_RELAY_CAPACITY};
pub use transform::{
    EdgeDetection, FrameTransform, Grayscale, HorizontalFlip, Passthrough, TransformKind,
};
