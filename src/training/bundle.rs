//! Persisted model bundle: fitted estimator plus its inference contract

use super::linear_models::{ElasticNetRegression, ScaledElasticNet};
use super::random_forest::RandomForest;
use super::Regressor;
use crate::error::{Result, TripcastError};
use crate::utils::{columns_to_array2, has_column};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Candidate model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    ElasticNet,
    RandomForest,
}

impl ModelFamily {
    /// Declaration order; earlier families win exact ties
    pub const ALL: [ModelFamily; 2] = [ModelFamily::ElasticNet, ModelFamily::RandomForest];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::ElasticNet => "elastic_net",
            ModelFamily::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elastic net hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticNetParams {
    pub alpha: f64,
    pub l1_ratio: f64,
}

/// Random forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
}

/// One point of a family's search grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hyperparameters {
    ElasticNet(ElasticNetParams),
    RandomForest(ForestParams),
}

impl Hyperparameters {
    pub fn family(&self) -> ModelFamily {
        match self {
            Hyperparameters::ElasticNet(_) => ModelFamily::ElasticNet,
            Hyperparameters::RandomForest(_) => ModelFamily::RandomForest,
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparameters::ElasticNet(p) => {
                write!(f, "alpha={} l1_ratio={}", p.alpha, p.l1_ratio)
            }
            Hyperparameters::RandomForest(p) => {
                let depth = p.max_depth.map_or("none".to_string(), |d| d.to_string());
                write!(
                    f,
                    "n_estimators={} max_depth={} min_samples_leaf={}",
                    p.n_estimators, depth, p.min_samples_leaf
                )
            }
        }
    }
}

/// A fitted (or ready to fit) estimator of either family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    ElasticNet(ScaledElasticNet),
    RandomForest(RandomForest),
}

impl FittedModel {
    /// Unfitted estimator configured from `params`
    pub fn from_params(params: &Hyperparameters, max_iter: usize, tol: f64, seed: u64) -> Self {
        match params {
            Hyperparameters::ElasticNet(p) => FittedModel::ElasticNet(ScaledElasticNet::new(
                ElasticNetRegression::new(p.alpha, p.l1_ratio)
                    .with_max_iter(max_iter)
                    .with_tol(tol),
            )),
            Hyperparameters::RandomForest(p) => FittedModel::RandomForest(
                RandomForest::new(p.n_estimators)
                    .with_max_depth(p.max_depth)
                    .with_min_samples_leaf(p.min_samples_leaf)
                    .with_random_state(seed),
            ),
        }
    }
}

impl Regressor for FittedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            FittedModel::ElasticNet(m) => m.fit(x, y),
            FittedModel::RandomForest(m) => Regressor::fit(m, x, y),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            FittedModel::ElasticNet(m) => m.predict(x),
            FittedModel::RandomForest(m) => Regressor::predict(m, x),
        }
    }
}

/// Fitted model packaged with its ordered feature list, target name, family
/// and chosen hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    model: FittedModel,
    features: Vec<String>,
    target: String,
    model_type: ModelFamily,
    params: Hyperparameters,
}

impl ModelBundle {
    pub fn new(
        model: FittedModel,
        features: Vec<String>,
        target: impl Into<String>,
        params: Hyperparameters,
    ) -> Self {
        Self {
            model,
            features,
            target: target.into(),
            model_type: params.family(),
            params,
        }
    }

    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    /// Feature names in the order the model consumes them
    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn model_type(&self) -> ModelFamily {
        self.model_type
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    /// Names of bundle features absent from `df`
    pub fn missing_features(&self, df: &DataFrame) -> Vec<String> {
        self.features
            .iter()
            .filter(|f| !has_column(df, f))
            .cloned()
            .collect()
    }

    /// Predict every row of `df`, reading features by name in bundle order.
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let missing = self.missing_features(df);
        if !missing.is_empty() {
            return Err(TripcastError::ConfigurationError(format!(
                "Missing feature columns: {}",
                missing.join(", ")
            )));
        }
        let x = columns_to_array2(df, &self.features)?;
        self.model.predict(&x)
    }

    /// Predict a single request given as a named feature map.
    ///
    /// Extra keys are ignored; every missing feature is reported at once.
    pub fn predict_one(&self, values: &HashMap<String, f64>) -> Result<f64> {
        let missing: Vec<&str> = self
            .features
            .iter()
            .filter(|f| !values.contains_key(f.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(TripcastError::FeatureNotFound(missing.join(", ")));
        }

        let row: Vec<f64> = self.features.iter().map(|f| values[f.as_str()]).collect();
        let x = Array2::from_shape_vec((1, row.len()), row)?;
        let prediction = self.model.predict(&x)?;
        prediction
            .first()
            .copied()
            .ok_or_else(|| TripcastError::TrainingError("Model returned no prediction".to_string()))
    }

    /// Save the bundle as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), model_type = %self.model_type, "Saved model bundle");
        Ok(())
    }

    /// Load a bundle saved by [`ModelBundle::save`]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TripcastError::ConfigurationError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
        let json = std::fs::read_to_string(path)?;
        let bundle: Self = serde_json::from_str(&json)?;
        if bundle.features.is_empty() {
            return Err(TripcastError::ConfigurationError(
                "Model bundle missing feature list.".to_string(),
            ));
        }
        Ok(bundle)
    }
}
