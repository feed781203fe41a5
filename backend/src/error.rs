//! Error types for the tiling and simulation engine.
//!
//! Configuration and state errors abort the current call and are never
//! retried. Storage errors from the catalog store are carried through
//! unmodified so callers can inspect the original context.

use crate::catalog::StoreError;

/// Result type for engine operations
pub type SurveyResult<T> = Result<T, SurveyError>;

/// Error type for the allocation, almanac, outcome and simulation layers.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    /// Invalid knob value, mismatched inputs or a date outside the run.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Caller broke a sequencing contract (e.g. visits not incremented).
    #[error("State error: {message}")]
    State { message: String },

    /// Tile-centre source could not be read or parsed.
    #[error("Tiling error: {message}")]
    Tiling { message: String },

    /// Persistence failure, surfaced as returned by the store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SurveyError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a tiling error.
    pub fn tiling(message: impl Into<String>) -> Self {
        Self::Tiling {
            message: message.into(),
        }
    }

    /// Whether this error came from a misconfigured call.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Whether this error is a sequencing violation.
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }
}
