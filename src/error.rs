//! Error types for the aggregation core
//!
//! Only [`AggregationError::Configuration`] is fatal. Malformed records and
//! per-series finalize failures are recoverable: they are counted and logged
//! at the pipeline boundary and never abort a report.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, AggregationError>;

/// Errors raised by the aggregation core
#[derive(Error, Debug)]
pub enum AggregationError {
    /// Invalid configuration or factory wiring. Aborts report generation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single record was rejected. Recoverable.
    #[error("Malformed record for series '{series}': {reason}")]
    MalformedRecord { series: String, reason: String },

    /// A single series could not produce its snapshot. Recoverable.
    #[error("Failed to finalize series '{series}': {reason}")]
    Finalize { series: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AggregationError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a malformed-record error
    pub fn malformed(series: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            series: series.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must abort report generation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
