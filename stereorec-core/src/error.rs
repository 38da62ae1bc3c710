//! Error types for stereorec-core.
//!
//! Only configuration problems are errors. Per-event data-quality
//! rejections are reported through [`crate::cuts::CutReason`] instead.

use thiserror::Error;

/// Result type alias for stereorec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal configuration errors that abort a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Telescope index not present in the array model.
    #[error("telescope index {index} out of range (array has {count} telescopes)")]
    TelescopeIndexOutOfRange { index: usize, count: usize },

    /// Array configuration exceeds the supported telescope count.
    #[error("array has {count} telescopes, maximum supported is {max}")]
    TooManyTelescopes { count: usize, max: usize },

    /// Per-telescope data does not match the array size.
    #[error("per-telescope data has {found} entries, array has {expected} telescopes")]
    TelescopeCountMismatch { expected: usize, found: usize },

    /// Lookup table missing, truncated, or inconsistent.
    #[error("invalid lookup table: {0}")]
    InvalidTable(String),

    /// Regression model feature contract does not match the pipeline features.
    #[error("regression model {model} expects features {found:?}, pipeline provides {expected:?}")]
    FeatureMismatch {
        model: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Requested upstream reconstruction method is not in the event stream.
    #[error("reconstruction method {index} requested, event stream provides {available}")]
    MethodIndexOutOfRange { index: usize, available: usize },

    /// Table filling requires simulated events with known truth.
    #[error("event {event} has no Monte Carlo truth (required for table filling)")]
    MissingTruth { event: u64 },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
