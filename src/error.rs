//! Unified error handling for the trip-tracker library.
//!
//! Only lifecycle commands (start, recovery, store construction) return errors to
//! the caller. Sample-level problems fall back to zero speed, and persistence
//! failures during an active trip are logged and swallowed by the tracker.

use thiserror::Error;

use crate::types::TripId;

/// Unified error type for trip-tracker operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrackerError {
    /// Location access denied or location services disabled
    #[error("Location unavailable: {message}")]
    LocationUnavailable { message: String },

    /// Command not valid in the current tracking state
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    /// Trip id not known to the store
    #[error("Trip {0} not found")]
    TripNotFound(TripId),

    /// Persistence/storage error
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The background tracking service has shut down
    #[error("Tracking service is no longer running")]
    ServiceClosed,
}

impl TrackerError {
    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        TrackerError::Persistence {
            message: message.into(),
        }
    }

    pub(crate) fn location(message: impl Into<String>) -> Self {
        TrackerError::LocationUnavailable {
            message: message.into(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::persistence(err.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for trip-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackerError::InvalidTransition {
            state: "active",
            action: "start",
        };
        assert_eq!(err.to_string(), "Cannot start while active");

        let err = TrackerError::TripNotFound(TripId(42));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_json_error_maps_to_config() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: TrackerError = parse.unwrap_err().into();
        assert!(matches!(err, TrackerError::Config { .. }));
    }
}
