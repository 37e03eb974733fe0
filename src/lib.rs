//! Tripcast - trip-duration modelling pipeline
//!
//! Turns raw taxi trip records into a trip-duration regression model and an
//! evaluation report through a four-node graph:
//!
//! raw → prepared → trained → evaluated
//!
//! # Modules
//!
//! ## Pipeline stages
//! - [`source`] - Raw dataset resolution (cached, downloaded, synthetic)
//! - [`features`] - Cleaning, feature derivation and selection
//! - [`training`] - Candidate families, cross-validation and model selection
//! - [`evaluation`] - Re-scoring a persisted model bundle
//! - [`pipeline`] - The node graph and its configuration
//!
//! ## Support
//! - [`preprocessing`] - Input standardization
//! - [`utils`] - Tabular IO and column extraction
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Pipeline stages
pub mod source;
pub mod features;
pub mod training;
pub mod evaluation;
pub mod pipeline;

// Support
pub mod preprocessing;
pub mod utils;
pub mod cli;

pub use error::{ErrorCategory, Result, TripcastError};

/// Prelude for convenient imports
pub mod prelude {
    // Error handling
    pub use crate::error::{ErrorCategory, Result, TripcastError};

    // Stages
    pub use crate::source::{Provenance, RawDataset, SourceConfig, SourceResolver};
    pub use crate::features::{FeatureBuilder, FeatureConfig, FeatureFrame, TARGET_COLUMN};
    pub use crate::training::{
        MetricsReport, ModelBundle, ModelFamily, ModelSelector, SelectorConfig,
    };
    pub use crate::evaluation::{EvaluationReport, Evaluator};

    // Graph
    pub use crate::pipeline::{NodeName, PipelineConfig, PipelineGraph, PipelineRun};

    // IO
    pub use crate::utils::{DataFormat, DataLoader, DataSaver};
}
