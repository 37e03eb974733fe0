//! Evaluation of a persisted model bundle against a dataset

use crate::error::{Result, TripcastError};
use crate::training::{Hyperparameters, ModelBundle, ModelFamily, RegressionMetrics, Regressor};
use crate::utils::{columns_to_array2, has_column, target_to_array1, DataLoader};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Recomputed metrics, persisted as `evaluation.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_type: ModelFamily,
    pub params: Hyperparameters,
    pub metrics: RegressionMetrics,
    pub target: String,
    pub features: Vec<String>,
}

impl EvaluationReport {
    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Saved evaluation report");
        Ok(())
    }
}

/// Scores a bundle on a dataset without mutating either
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Verify every required column, then predict and score.
    pub fn evaluate(&self, bundle: &ModelBundle, df: &DataFrame) -> Result<EvaluationReport> {
        let target = bundle.target();
        if !has_column(df, target) {
            return Err(TripcastError::ConfigurationError(format!(
                "Missing target column: {}",
                target
            )));
        }
        let missing = bundle.missing_features(df);
        if !missing.is_empty() {
            return Err(TripcastError::ConfigurationError(format!(
                "Missing feature columns: {}",
                missing.join(", ")
            )));
        }

        let x = columns_to_array2(df, bundle.features())?;
        let y = target_to_array1(df, target)?;
        let predictions = bundle.model().predict(&x)?;
        let metrics = RegressionMetrics::compute(&y, &predictions)?;

        info!(rows = metrics.samples, mae = metrics.mae, r2 = metrics.r2, "Evaluation complete");
        Ok(EvaluationReport {
            model_type: bundle.model_type(),
            params: *bundle.params(),
            metrics,
            target: target.to_string(),
            features: bundle.features().to_vec(),
        })
    }

    /// Load the dataset and bundle from disk and evaluate.
    pub fn evaluate_files(&self, data_path: &Path, model_path: &Path) -> Result<EvaluationReport> {
        if !data_path.exists() {
            return Err(TripcastError::ConfigurationError(format!(
                "Data file not found: {}",
                data_path.display()
            )));
        }
        let bundle = ModelBundle::load(model_path)?;
        let df = DataLoader::new().load_auto(data_path)?;
        self.evaluate(&bundle, &df)
    }
}
