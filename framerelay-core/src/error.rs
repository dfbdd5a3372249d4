//! Error types for FrameRelay

use std::time::Duration;
use thiserror::Error;

/// Main error type for FrameRelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// The WebRTC engine rejected an operation
    #[error("WebRTC engine error during {operation}: {reason}")]
    Engine {
        /// Operation that was being performed
        operation: String,
        /// Reason reported by the engine
        reason: String,
    },

    /// A session description could not be parsed or applied
    #[error("Invalid session description: {reason}")]
    InvalidSessionDescription {
        /// Reason the description was rejected
        reason: String,
    },

    /// Signaling exchange failed before a response was received
    #[error("Signaling failed: {reason}")]
    Signaling {
        /// Reason for signaling failure
        reason: String,
    },

    /// Signaling peer answered with a non-success status
    #[error("Signaling endpoint returned status {status}: {body}")]
    SignalingStatus {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// Signaling peer answered with something other than JSON
    #[error("Unexpected signaling content type: {content_type}")]
    UnexpectedContentType {
        /// Content type that was received
        content_type: String,
    },

    /// Signaling peer did not answer in time
    #[error("Signaling request to {url} timed out after {duration:?}")]
    SignalingTimeout {
        /// URL the request was sent to
        url: String,
        /// Total request timeout
        duration: Duration,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Local capture device failed
    #[error("Capture failed: {reason}")]
    Capture {
        /// Reason for capture failure
        reason: String,
    },

    /// Media processing error
    #[error("Media processing error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {field} - {reason}")]
    Configuration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying error
        #[from]
        source: std::io::Error,
    },

    /// JSON encoding or decoding error
    #[error("JSON error: {source}")]
    Json {
        /// Underlying error
        #[from]
        source: serde_json::Error,
    },
}

impl RelayError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            RelayError::Engine { .. } => "ENGINE_ERROR".to_string(),
            RelayError::InvalidSessionDescription { .. } => {
                "INVALID_SESSION_DESCRIPTION".to_string()
            }
            RelayError::Signaling { .. } => "SIGNALING_FAILED".to_string(),
            RelayError::SignalingStatus { .. } => "SIGNALING_STATUS".to_string(),
            RelayError::UnexpectedContentType { .. } => "UNEXPECTED_CONTENT_TYPE".to_string(),
            RelayError::SignalingTimeout { .. } => "SIGNALING_TIMEOUT".to_string(),
            RelayError::Timeout { .. } => "TIMEOUT".to_string(),
            RelayError::InvalidState { .. } => "INVALID_STATE".to_string(),
            RelayError::Capture { .. } => "CAPTURE_FAILED".to_string(),
            RelayError::Media { .. } => "MEDIA_PROCESSING_ERROR".to_string(),
            RelayError::Configuration { .. } => "INVALID_CONFIGURATION".to_string(),
            RelayError::Io { .. } => "IO_ERROR".to_string(),
            RelayError::Json { .. } => "JSON_ERROR".to_string(),
        }
    }

    /// Whether this error belongs to the signaling exchange
    pub fn is_signaling(&self) -> bool {
        matches!(
            self,
            RelayError::Signaling { .. }
                | RelayError::SignalingStatus { .. }
                | RelayError::UnexpectedContentType { .. }
                | RelayError::SignalingTimeout { .. }
                | RelayError::InvalidSessionDescription { .. }
        )
    }

    pub(crate) fn engine(operation: &str, err: impl std::fmt::Display) -> Self {
        RelayError::Engine {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result type used across FrameRelay crates
pub type RelayResult<T> = Result<T, RelayError>;
