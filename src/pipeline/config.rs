//! Pipeline configuration

use crate::error::{Result, TripcastError};
use crate::features::FeatureConfig;
use crate::source::SourceConfig;
use crate::training::SelectorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the pipeline graph needs, supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Where raw trip files are cached, downloaded or synthesized
    pub raw_dir: PathBuf,
    /// Where processed data, `features.txt` and `data_summary.txt` go
    pub processed_dir: PathBuf,
    /// Model bundle location
    pub model_path: PathBuf,
    /// Where `metrics.json` and `evaluation.json` go
    pub reports_dir: PathBuf,

    pub source: SourceConfig,
    pub features: FeatureConfig,
    pub selector: SelectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            model_path: PathBuf::from("models/model.json"),
            reports_dir: PathBuf::from("reports"),
            source: SourceConfig::default(),
            features: FeatureConfig::default(),
            selector: SelectorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Place every directory under `root` using the default layout
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            raw_dir: root.join("data").join("raw"),
            processed_dir: root.join("data").join("processed"),
            model_path: root.join("models").join("model.json"),
            reports_dir: root.join("reports"),
            ..Self::default()
        }
    }

    pub fn with_raw_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_dir = dir.into();
        self
    }

    pub fn with_processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processed_dir = dir.into();
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }

    pub fn with_features(mut self, features: FeatureConfig) -> Self {
        self.features = features;
        self
    }

    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    /// Processed data file for the configured output format
    pub fn processed_data_path(&self) -> PathBuf {
        self.processed_dir.join(format!(
            "processed_data.{}",
            self.features.output_format.extension()
        ))
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.reports_dir.join("metrics.json")
    }

    pub fn evaluation_path(&self) -> PathBuf {
        self.reports_dir.join("evaluation.json")
    }

    /// Load a configuration saved as JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            TripcastError::ConfigurationError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            TripcastError::ConfigurationError(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
