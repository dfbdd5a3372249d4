//! Media processing error types and handling
//!
//! Errors raised while converting, transforming, encoding or capturing
//! frames. Frame-processing errors are normally swallowed by the fail-open
//! adapter; capture errors are fatal to the local process.

use framerelay_core::RelayError;
use thiserror::Error;

/// Main error type for media processing operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        /// Underlying error
        #[from]
        source: std::io::Error,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Frame dimensions unusable for the operation
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Frame width
        width: u32,
        /// Frame height
        height: u32,
    },

    /// Transform produced an image of a different shape
    #[error("Transform {transform} changed resolution from {expected} to {actual}")]
    ShapeMismatch {
        /// Transform name
        transform: String,
        /// Input resolution
        expected: String,
        /// Output resolution
        actual: String,
    },

    /// Transform reported an error
    #[error("Transform {transform} failed: {reason}")]
    TransformFailed {
        /// Transform name
        transform: String,
        /// Failure reason
        reason: String,
    },

    /// Transform panicked
    #[error("Transform {transform} panicked: {message}")]
    TransformPanicked {
        /// Transform name
        transform: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Encoding operation failed
    #[error("Encoding failed: {codec} - {reason}")]
    EncodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Decoding operation failed
    #[error("Decoding failed: {codec} - {reason}")]
    DecodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Codec initialization failed
    #[error("Codec initialization failed: {codec} - {reason}")]
    CodecInitializationFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Capture device failed to open or deliver a frame
    #[error("Capture failed on {device}: {reason}")]
    CaptureFailed {
        /// Device description
        device: String,
        /// Failure reason
        reason: String,
    },

    /// Capture not active error
    #[error("Capture not active")]
    CaptureNotActive,

    /// Reading from a remote track failed or the track ended
    #[error("Track read failed: {reason}")]
    TrackRead {
        /// Failure reason
        reason: String,
    },

    /// Writing a track sample failed
    #[error("Track write failed: {reason}")]
    TrackWrite {
        /// Failure reason
        reason: String,
    },

    /// Display sink failed
    #[error("Display error: {message}")]
    Display {
        /// Error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::InvalidDimensions { .. } => ErrorCategory::Data,
            MediaError::ShapeMismatch { .. } => ErrorCategory::Transform,
            MediaError::TransformFailed { .. } => ErrorCategory::Transform,
            MediaError::TransformPanicked { .. } => ErrorCategory::Transform,
            MediaError::EncodingFailed { .. } => ErrorCategory::Codec,
            MediaError::DecodingFailed { .. } => ErrorCategory::Codec,
            MediaError::CodecInitializationFailed { .. } => ErrorCategory::Codec,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::CaptureFailed { .. } => ErrorCategory::Device,
            MediaError::CaptureNotActive => ErrorCategory::State,
            MediaError::TrackRead { .. } => ErrorCategory::Network,
            MediaError::TrackWrite { .. } => ErrorCategory::Network,
            MediaError::Display { .. } => ErrorCategory::System,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O, permissions, etc.)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Codec-related errors
    Codec,
    /// Data validation errors
    Data,
    /// Per-frame transform errors
    Transform,
    /// Device and hardware errors
    Device,
    /// State management errors
    State,
    /// Network-related errors
    Network,
}

impl From<MediaError> for RelayError {
    fn from(err: MediaError) -> Self {
        match err.category() {
            ErrorCategory::Device => RelayError::Capture {
                reason: err.to_string(),
            },
            ErrorCategory::Configuration => RelayError::Configuration {
                field: "media".to_string(),
                reason: err.to_string(),
            },
            _ => RelayError::Media {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = MediaError::TransformFailed {
            transform: "edges".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Transform);

        let err = MediaError::CaptureFailed {
            device: "camera 0".to_string(),
            reason: "busy".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Device);
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::InvalidFrameData {
            expected: 1024,
            actual: 512,
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame data: expected 1024 bytes, got 512"
        );
    }

    #[test]
    fn test_capture_error_maps_to_relay_capture() {
        let err: RelayError = MediaError::DeviceNotFound {
            device_id: "3".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "CAPTURE_FAILED");

        let err: RelayError = MediaError::DecodingFailed {
            codec: "H.264".to_string(),
            reason: "corrupt".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "MEDIA_PROCESSING_ERROR");
    }
}
