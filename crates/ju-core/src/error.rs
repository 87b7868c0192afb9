//! Error types for jetunfold

use thiserror::Error;

/// jetunfold error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Named object, group, or file absent from a store
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-positive luminosity or event count
    #[error("invalid normalization for {what}: {value}")]
    InvalidNormalization {
        /// What was being normalized (trigger name, luminosity label, ...)
        what: String,
        /// Offending value
        value: f64,
    },

    /// Unfolding engine did not converge or returned a singular result
    #[error("unfolding engine failure: {0}")]
    EngineFailure(String),

    /// Empty, non-finite, or non-increasing bin edges; incompatible binnings
    #[error("malformed binning: {0}")]
    MalformedBinning(String),

    /// Event table does not provide the fields a schema requires
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Whether this failure may be recovered locally by skipping one
    /// regularization strength.
    pub fn is_engine_failure(&self) -> bool {
        matches!(self, Error::EngineFailure(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
