//! # FrameRelay Diagnostics
//!
//! Logging setup for the FrameRelay binaries and periodic reporting of
//! frame-pipeline and connection statistics.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection_analyzer;
pub mod logging;
pub mod stats;

// Re-export main types
pub use connection_analyzer::{analyze, summarize, ConnectionInfo, ConnectionSummary};
pub use logging::{init_logging, LoggingError, DEFAULT_DIRECTIVE};
pub use stats::StatsReporter;
