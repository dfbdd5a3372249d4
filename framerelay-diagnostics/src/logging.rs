//! Process-wide tracing subscriber setup

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Logging setup errors
#[derive(Error, Debug)]
pub enum LoggingError {
    /// The fallback directive could not be parsed
    #[error("Invalid log directive '{directive}': {reason}")]
    InvalidDirective {
        /// Directive as given
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Logging already initialized: {reason}")]
    AlreadyInitialized {
        /// Subscriber error
        reason: String,
    },
}

/// Build the filter: `RUST_LOG` if set and valid, else `default_directive`
pub fn env_filter(default_directive: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directive).map_err(|e| LoggingError::InvalidDirective {
        directive: default_directive.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global fmt subscriber
///
/// Calling this a second time returns [`LoggingError::AlreadyInitialized`].
pub fn init_logging(default_directive: &str) -> Result<(), LoggingError> {
    let filter = env_filter(default_directive)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_directive() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = env_filter("framerelay=notalevel").unwrap_err();
        assert!(matches!(err, LoggingError::InvalidDirective { .. }));
    }

    #[test]
    fn test_second_init_fails() {
        // Another test in this binary may already have installed a subscriber
        let _ = init_logging("debug");
        assert!(matches!(
            init_logging("debug"),
            Err(LoggingError::AlreadyInitialized { .. })
        ));
    }
}
