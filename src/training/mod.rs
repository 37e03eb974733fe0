//! Model training module
//!
//! Provides the two candidate families and the machinery that picks between them:
//! - Elastic net on standardized inputs
//! - Random forest of regression trees
//! - Train/test split and K-fold cross-validation
//! - Regression metrics
//! - Model selection and the persisted model bundle

pub mod bundle;
pub mod cross_validation;
pub mod decision_tree;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;
pub mod selector;

pub use bundle::{
    ElasticNetParams, FittedModel, ForestParams, Hyperparameters, ModelBundle, ModelFamily,
};
pub use cross_validation::{train_test_split, CVResults, CVSplit, KFold};
pub use decision_tree::{DecisionTree, TreeNode};
pub use linear_models::{ElasticNetRegression, ScaledElasticNet};
pub use metrics::{mean_absolute_error, RegressionMetrics};
pub use random_forest::RandomForest;
pub use selector::{
    CandidateSummary, MetricsReport, ModelSelector, PartitionMetrics, SampleCounts,
    SelectorConfig,
};

use crate::error::Result;
use ndarray::{Array1, Array2};

/// Trait for regression estimators
pub trait Regressor: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}
