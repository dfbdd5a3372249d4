//! Fail-open frame-processing adapter
//!
//! [`FrameAdapter`] sits between the decoder and the encoder of a media loop.
//! Each frame is converted to BGR, handed to the configured
//! [`FrameTransform`], converted back to I420 and stamped with the input
//! frame's timestamp and time base. If conversion or the transform fails, or
//! the transform panics, the original frame is forwarded unchanged and the
//! failure is logged.

use crate::convert::{bgr_to_i420, i420_to_bgr};
use crate::error::{MediaError, MediaResult};
use crate::frame::{BgrImage, VideoFrame};
use crate::transform::FrameTransform;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters kept by an adapter
#[derive(Debug, Default)]
pub struct AdapterStats {
    processed: AtomicU64,
    passed_through: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`AdapterStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdapterSnapshot {
    /// Frames successfully transformed
    pub processed: u64,
    /// Frames forwarded without a transform configured
    pub passed_through: u64,
    /// Frames forwarded unchanged because processing failed
    pub failed: u64,
}

impl AdapterSnapshot {
    /// Every frame that left the adapter
    pub fn total(&self) -> u64 {
        self.processed + self.passed_through + self.failed
    }
}

impl AdapterStats {
    /// Current counter values
    pub fn snapshot(&self) -> AdapterSnapshot {
        AdapterSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Applies an optional transform to decoded frames, never failing
#[derive(Clone)]
pub struct FrameAdapter {
    transform: Option<Arc<dyn FrameTransform>>,
    stats: Arc<AdapterStats>,
}

impl std::fmt::Debug for FrameAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAdapter")
            .field("transform", &self.transform_name())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl Default for FrameAdapter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FrameAdapter {
    /// Create an adapter; `None` forwards frames untouched
    pub fn new(transform: Option<Arc<dyn FrameTransform>>) -> Self {
        Self {
            transform,
            stats: Arc::new(AdapterStats::default()),
        }
    }

    /// Adapter around a concrete transform
    pub fn with_transform<T: FrameTransform + 'static>(transform: T) -> Self {
        Self::new(Some(Arc::new(transform)))
    }

    /// Name of the configured transform
    pub fn transform_name(&self) -> &str {
        self.transform
            .as_ref()
            .map(|t| t.name())
            .unwrap_or("passthrough")
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<AdapterStats> {
        Arc::clone(&self.stats)
    }

    /// Process a frame, propagating any failure
    pub fn try_process(&self, frame: &VideoFrame) -> MediaResult<VideoFrame> {
        let Some(transform) = &self.transform else {
            return Ok(frame.clone());
        };
        let image = i420_to_bgr(frame)?;
        let output = run_transform(transform.as_ref(), &image)?;
        bgr_to_i420(&output, frame.pts, frame.time_base)
    }

    /// Process a frame; on failure the input frame is returned unchanged
    pub fn process(&self, frame: VideoFrame) -> VideoFrame {
        if self.transform.is_none() {
            self.stats.passed_through.fetch_add(1, Ordering::Relaxed);
            return frame;
        }

        match self.try_process(&frame) {
            Ok(output) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                output
            }
            Err(e) => {
                let failed = self.stats.failed.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    transform = self.transform_name(),
                    failed,
                    "Frame processing failed, forwarding original frame: {}",
                    e
                );
                frame
            }
        }
    }

    /// Apply the transform to an already converted BGR image, failing open
    pub fn process_image(&self, image: BgrImage) -> BgrImage {
        let Some(transform) = &self.transform else {
            self.stats.passed_through.fetch_add(1, Ordering::Relaxed);
            return image;
        };

        match run_transform(transform.as_ref(), &image) {
            Ok(output) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                output
            }
            Err(e) => {
                let failed = self.stats.failed.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    transform = self.transform_name(),
                    failed,
                    "Image processing failed, using original image: {}",
                    e
                );
                image
            }
        }
    }
}

fn run_transform(transform: &dyn FrameTransform, image: &BgrImage) -> MediaResult<BgrImage> {
    let output = catch_unwind(AssertUnwindSafe(|| transform.apply(image))).map_err(|payload| {
        MediaError::TransformPanicked {
            transform: transform.name().to_string(),
            message: panic_message(payload.as_ref()),
        }
    })?;

    let output = output.map_err(|e| match e {
        MediaError::TransformFailed { .. } => e,
        other => MediaError::TransformFailed {
            transform: transform.name().to_string(),
            reason: other.to_string(),
        },
    })?;

    if output.dimensions() != image.dimensions() {
        return Err(MediaError::ShapeMismatch {
            transform: transform.name().to_string(),
            expected: format!("{}x{}", image.width(), image.height()),
            actual: format!("{}x{}", output.width(), output.height()),
        });
    }
    Ok(output)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
