//! Error types for the tripcast pipeline

use crate::pipeline::NodeName;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, TripcastError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum TripcastError {
    /// Missing required paths, columns or settings
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Empty result after filtering, missing target, unusable rows
    #[error("Data quality error: {0}")]
    DataQualityError(String),

    #[error("Transfer error: {url}: {reason}")]
    TransferError { url: String, reason: String },

    /// Every candidate model family failed
    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Convergence failed after {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A pipeline node failed; carries the node name and the underlying cause
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: NodeName,
        #[source]
        source: Box<TripcastError>,
    },
}

/// Coarse failure class used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    DataQuality,
    Transfer,
    Training,
    Internal,
}

impl TripcastError {
    /// Classify the error; stage wrappers report their inner cause's class.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TripcastError::ConfigurationError(_) | TripcastError::FeatureNotFound(_) => {
                ErrorCategory::Configuration
            }
            TripcastError::DataQualityError(_) => ErrorCategory::DataQuality,
            TripcastError::TransferError { .. } => ErrorCategory::Transfer,
            TripcastError::TrainingError(_) | TripcastError::ConvergenceError { .. } => {
                ErrorCategory::Training
            }
            TripcastError::Stage { source, .. } => source.category(),
            _ => ErrorCategory::Internal,
        }
    }

    /// Name of the pipeline node that failed, if the error passed through the graph
    pub fn stage(&self) -> Option<NodeName> {
        match self {
            TripcastError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn in_stage(self, stage: NodeName) -> Self {
        TripcastError::Stage {
            stage,
            source: Box::new(self),
        }
    }
}

impl From<polars::error::PolarsError> for TripcastError {
    fn from(err: polars::error::PolarsError) -> Self {
        TripcastError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TripcastError {
    fn from(err: serde_json::Error) -> Self {
        TripcastError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TripcastError {
    fn from(err: ndarray::ShapeError) -> Self {
        TripcastError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
