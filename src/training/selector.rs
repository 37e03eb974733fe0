//! Model selection: split, tune each family with K-fold CV, keep the lowest test MAE

use super::bundle::{
    ElasticNetParams, FittedModel, ForestParams, Hyperparameters, ModelBundle, ModelFamily,
};
use super::cross_validation::{train_test_split, CVResults, CVSplit, KFold};
use super::metrics::{mean_absolute_error, RegressionMetrics};
use super::Regressor;
use crate::error::{Result, TripcastError};
use crate::features::FeatureFrame;
use crate::utils::{columns_to_array2, has_column, target_to_array1};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Settings for [`ModelSelector`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Share of rows held out for the final comparison
    pub test_size: f64,
    /// Seed of the split shuffle and of the forest bootstraps
    pub seed: u64,
    pub cv_folds: usize,
    pub elastic_net_grid: Vec<ElasticNetParams>,
    pub forest_grid: Vec<ForestParams>,
    /// Coordinate descent sweeps allowed per elastic net fit
    pub max_iter: usize,
    /// Relative coefficient-change tolerance of the elastic net
    pub tol: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            cv_folds: 3,
            elastic_net_grid: Self::default_elastic_net_grid(),
            forest_grid: Self::default_forest_grid(),
            max_iter: 5000,
            tol: 1e-4,
        }
    }
}

impl SelectorConfig {
    /// alpha ∈ {0.01, 0.1, 1.0} × l1_ratio ∈ {0.1, 0.5, 0.9}
    pub fn default_elastic_net_grid() -> Vec<ElasticNetParams> {
        let mut grid = Vec::new();
        for alpha in [0.01, 0.1, 1.0] {
            for l1_ratio in [0.1, 0.5, 0.9] {
                grid.push(ElasticNetParams { alpha, l1_ratio });
            }
        }
        grid
    }

    /// n_estimators ∈ {150, 300} × max_depth ∈ {none, 12, 24} × min_samples_leaf ∈ {1, 2}
    pub fn default_forest_grid() -> Vec<ForestParams> {
        let mut grid = Vec::new();
        for n_estimators in [150, 300] {
            for max_depth in [None, Some(12), Some(24)] {
                for min_samples_leaf in [1, 2] {
                    grid.push(ForestParams {
                        n_estimators,
                        max_depth,
                        min_samples_leaf,
                    });
                }
            }
        }
        grid
    }

    pub fn with_elastic_net_grid(mut self, grid: Vec<ElasticNetParams>) -> Self {
        self.elastic_net_grid = grid;
        self
    }

    pub fn with_forest_grid(mut self, grid: Vec<ForestParams>) -> Self {
        self.forest_grid = grid;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Grid points of one family, in declaration order
    pub fn grid(&self, family: ModelFamily) -> Vec<Hyperparameters> {
        match family {
            ModelFamily::ElasticNet => self
                .elastic_net_grid
                .iter()
                .copied()
                .map(Hyperparameters::ElasticNet)
                .collect(),
            ModelFamily::RandomForest => self
                .forest_grid
                .iter()
                .copied()
                .map(Hyperparameters::RandomForest)
                .collect(),
        }
    }
}

/// Train and test metrics of the winner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionMetrics {
    pub train: RegressionMetrics,
    pub test: RegressionMetrics,
}

/// Row counts of the split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub train: usize,
    pub test: usize,
}

/// Outcome of tuning one family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub model_type: ModelFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Hyperparameters>,
    /// Mean fold MAE of the chosen configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_mae: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_mae: Option<f64>,
    /// Why the family was excluded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metrics of the selected model, persisted as `metrics.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub model_type: ModelFamily,
    pub params: Hyperparameters,
    pub metrics: PartitionMetrics,
    pub features: Vec<String>,
    pub target: String,
    pub samples: SampleCounts,
    #[serde(default)]
    pub candidates: Vec<CandidateSummary>,
}

impl MetricsReport {
    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Saved metrics");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// A family's best configuration refit on the whole train partition
struct TunedCandidate {
    params: Hyperparameters,
    cv: CVResults,
    model: FittedModel,
    test_mae: f64,
}

/// Row partitions shared by every candidate
struct SplitData {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

/// Picks the best model family for a feature frame
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    config: SelectorConfig,
}

impl ModelSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Split, tune both families in parallel and bundle the winner.
    pub fn select(&self, frame: &FeatureFrame) -> Result<(ModelBundle, MetricsReport)> {
        let df = frame.frame();
        let target = frame.target();
        if !has_column(df, target) {
            return Err(TripcastError::DataQualityError(format!(
                "Missing target column: {}",
                target
            )));
        }
        let features = frame.features().to_vec();
        if features.is_empty() {
            return Err(TripcastError::DataQualityError(
                "No feature columns to train on".to_string(),
            ));
        }

        let x = columns_to_array2(df, &features)?;
        let y = target_to_array1(df, target)?;
        let data = self.split(&x, &y)?;
        info!(
            train = data.y_train.len(),
            test = data.y_test.len(),
            features = features.len(),
            "Split training data"
        );

        let outcomes: Vec<(ModelFamily, Result<TunedCandidate>)> = ModelFamily::ALL
            .par_iter()
            .map(|&family| (family, self.tune_family(family, &data)))
            .collect();

        let mut summaries = Vec::with_capacity(outcomes.len());
        let mut winner: Option<TunedCandidate> = None;
        for (family, outcome) in outcomes {
            match outcome {
                Ok(candidate) => {
                    info!(
                        model_type = %family,
                        params = %candidate.params,
                        cv_mae = candidate.cv.mean_score,
                        test_mae = candidate.test_mae,
                        "Tuned candidate"
                    );
                    summaries.push(CandidateSummary {
                        model_type: family,
                        params: Some(candidate.params),
                        cv_mae: Some(candidate.cv.mean_score),
                        test_mae: Some(candidate.test_mae),
                        error: None,
                    });
                    // Strictly lower keeps the earlier family on ties
                    if winner.as_ref().map_or(true, |w| candidate.test_mae < w.test_mae) {
                        winner = Some(candidate);
                    }
                }
                Err(e) => {
                    warn!(model_type = %family, error = %e, "Candidate excluded");
                    summaries.push(CandidateSummary {
                        model_type: family,
                        params: None,
                        cv_mae: None,
                        test_mae: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let best = winner.ok_or_else(|| {
            let reasons: Vec<String> = summaries
                .iter()
                .map(|s| format!("{}: {}", s.model_type, s.error.as_deref().unwrap_or("unknown")))
                .collect();
            TripcastError::TrainingError(format!(
                "Model training failed to produce a candidate ({})",
                reasons.join("; ")
            ))
        })?;

        let train_pred = best.model.predict(&data.x_train)?;
        let test_pred = best.model.predict(&data.x_test)?;
        let metrics = PartitionMetrics {
            train: RegressionMetrics::compute(&data.y_train, &train_pred)?,
            test: RegressionMetrics::compute(&data.y_test, &test_pred)?,
        };

        let report = MetricsReport {
            model_type: best.params.family(),
            params: best.params,
            metrics,
            features: features.clone(),
            target: target.to_string(),
            samples: SampleCounts {
                train: data.y_train.len(),
                test: data.y_test.len(),
            },
            candidates: summaries,
        };
        info!(
            model_type = %report.model_type,
            test_mae = metrics.test.mae,
            test_r2 = metrics.test.r2,
            "Selected model"
        );

        let bundle = ModelBundle::new(best.model, features, target, best.params);
        Ok((bundle, report))
    }

    fn split(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SplitData> {
        let (train, test) = train_test_split(y.len(), self.config.test_size, self.config.seed)?;
        if test.len() < 2 {
            return Err(TripcastError::DataQualityError(format!(
                "Need at least 2 test rows, got {} from {} rows",
                test.len(),
                y.len()
            )));
        }
        if train.len() < self.config.cv_folds {
            return Err(TripcastError::DataQualityError(format!(
                "Need at least {} train rows for {}-fold CV, got {}",
                self.config.cv_folds,
                self.config.cv_folds,
                train.len()
            )));
        }

        Ok(SplitData {
            x_train: x.select(Axis(0), &train),
            y_train: y.select(Axis(0), &train),
            x_test: x.select(Axis(0), &test),
            y_test: y.select(Axis(0), &test),
        })
    }

    /// Grid search one family by mean fold MAE, refit the best configuration on
    /// the whole train partition and score it on the test partition.
    fn tune_family(&self, family: ModelFamily, data: &SplitData) -> Result<TunedCandidate> {
        let grid = self.config.grid(family);
        if grid.is_empty() {
            return Err(TripcastError::ConfigurationError(format!(
                "Empty hyperparameter grid for {}",
                family
            )));
        }
        let folds = KFold::new(self.config.cv_folds).split(data.y_train.len())?;

        let scored: Vec<Result<CVResults>> = grid
            .par_iter()
            .map(|params| self.cross_validate(params, data, &folds))
            .collect();

        let mut best: Option<(Hyperparameters, CVResults)> = None;
        let mut last_error = None;
        for (params, result) in grid.iter().zip(scored) {
            match result {
                Ok(cv) => {
                    debug!(
                        model_type = %family,
                        params = %params,
                        cv_mae = cv.mean_score,
                        "Scored configuration"
                    );
                    if best.as_ref().map_or(true, |(_, b)| cv.mean_score < b.mean_score) {
                        best = Some((*params, cv));
                    }
                }
                Err(e) => {
                    debug!(
                        model_type = %family,
                        params = %params,
                        error = %e,
                        "Configuration dropped"
                    );
                    last_error = Some(e);
                }
            }
        }

        let (params, cv) = best.ok_or_else(|| {
            TripcastError::TrainingError(format!(
                "No {} configuration could be fitted: {}",
                family,
                last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
            ))
        })?;

        let mut model = self.build(&params);
        model.fit(&data.x_train, &data.y_train)?;
        let test_pred = checked_predict(&model, &data.x_test)?;
        let test_mae = mean_absolute_error(&data.y_test, &test_pred);

        Ok(TunedCandidate {
            params,
            cv,
            model,
            test_mae,
        })
    }

    fn cross_validate(
        &self,
        params: &Hyperparameters,
        data: &SplitData,
        folds: &[CVSplit],
    ) -> Result<CVResults> {
        let mut scores = Vec::with_capacity(folds.len());
        for fold in folds {
            let x_fit = data.x_train.select(Axis(0), &fold.train_indices);
            let y_fit = data.y_train.select(Axis(0), &fold.train_indices);
            let x_val = data.x_train.select(Axis(0), &fold.test_indices);
            let y_val = data.y_train.select(Axis(0), &fold.test_indices);

            let mut model = self.build(params);
            model.fit(&x_fit, &y_fit)?;
            let pred = checked_predict(&model, &x_val)?;
            scores.push(mean_absolute_error(&y_val, &pred));
        }
        Ok(CVResults::from_scores(scores))
    }

    fn build(&self, params: &Hyperparameters) -> FittedModel {
        FittedModel::from_params(params, self.config.max_iter, self.config.tol, self.config.seed)
    }
}

/// Predict and reject non-finite outputs
fn checked_predict(model: &FittedModel, x: &Array2<f64>) -> Result<Array1<f64>> {
    let pred = model.predict(x)?;
    if pred.iter().any(|v| !v.is_finite()) {
        return Err(TripcastError::TrainingError(
            "Model produced non-finite predictions".to_string(),
        ));
    }
    Ok(pred)
}
