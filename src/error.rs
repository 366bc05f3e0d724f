//! Error types for the telemetry simulation and detection pipeline.

use thiserror::Error;

/// Result type alias for aerosec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Degenerate column kind detected while fitting a scaler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateKind {
    /// Standardization: the feature has zero variance
    ZeroVariance,
    /// Min-max normalization: the feature has zero range
    ZeroRange,
}

impl std::fmt::Display for DegenerateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegenerateKind::ZeroVariance => write!(f, "zero variance"),
            DegenerateKind::ZeroRange => write!(f, "zero range"),
        }
    }
}

/// Error types for generation, scaling, detection and evaluation
#[derive(Debug, Error)]
pub enum Error {
    /// A configured parameter is outside its valid domain
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name as it appears in configuration
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// A feature column cannot be scaled without dividing by zero
    #[error("Degenerate feature #{index} ({name}): {kind}")]
    DegenerateFeature {
        /// Column index in the feature matrix
        index: usize,
        /// Column name, when known
        name: String,
        /// Which statistic collapsed
        kind: DegenerateKind,
    },

    /// transform/predict was called before fit
    #[error("Not fitted: {0} must be fitted before use")]
    NotFitted(&'static str),

    /// Input shape does not match the fitted state
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        got: usize,
    },

    /// An operation received no data
    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`]
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether the caller can recover by choosing different parameters
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidParameter { .. } | Error::DegenerateFeature { .. } | Error::Config(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
