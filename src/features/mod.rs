//! Feature building
//!
//! Turns a [`RawDataset`] into a training-ready [`FeatureFrame`]:
//! load and concatenate, optionally sample, derive the target, apply range
//! filters, derive features and select the model inputs.

pub mod cleaning;
pub mod engineering;

pub use cleaning::{clean_trips, parse_timestamp, timestamp_columns};
pub use engineering::{engineer_features, select_features, FEATURE_ALLOW_LIST};

use crate::error::{Result, TripcastError};
use crate::source::RawDataset;
use crate::utils::{has_column, DataFormat, DataLoader, DataSaver};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Regression target: trip duration in seconds
pub const TARGET_COLUMN: &str = "trip_duration";

/// Normalized pickup time carried between cleaning and feature derivation
pub(crate) const PICKUP_EPOCH_MS: &str = "pickup_epoch_ms";

/// Settings for [`FeatureBuilder`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Cap on the number of raw rows, sampled without replacement
    pub sample_size: Option<usize>,
    pub sample_seed: u64,
    /// Format of the persisted processed data
    pub output_format: DataFormat,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_size: None,
            sample_seed: 42,
            output_format: DataFormat::Csv,
        }
    }
}

impl FeatureConfig {
    pub fn with_sample_size(mut self, sample_size: Option<usize>) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_output_format(mut self, format: DataFormat) -> Self {
        self.output_format = format;
        self
    }
}

/// Training-ready table: selected features plus a fully populated target
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    frame: DataFrame,
    features: Vec<String>,
    target: String,
}

impl FeatureFrame {
    /// Wrap an already-processed frame; every non-target column is a feature.
    pub fn from_frame(frame: DataFrame, target: &str) -> Result<Self> {
        if !has_column(&frame, target) {
            return Err(TripcastError::DataQualityError(format!(
                "Missing target column: {}",
                target
            )));
        }
        let features = frame
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != target)
            .map(|name| name.to_string())
            .collect();
        Ok(Self {
            frame,
            features,
            target: target.to_string(),
        })
    }

    /// Load processed data written by [`FeatureFrame::write`] or any compatible file
    pub fn load(path: &Path, target: &str) -> Result<Self> {
        let frame = DataLoader::new().load_auto(path)?;
        Self::from_frame(frame, target)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Feature names, in column order
    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Persist the frame, `features.txt` and `data_summary.txt` under `dir`.
    pub fn write(&self, dir: &Path, format: DataFormat) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let data_path = dir.join(format!("processed_data.{}", format.extension()));
        let mut frame = self.frame.clone();
        DataSaver::save(&mut frame, &data_path, format)?;

        let mut features_txt = self.features.join("\n");
        features_txt.push('\n');
        std::fs::write(dir.join("features.txt"), features_txt)?;

        let summary = [
            "Dataset Summary".to_string(),
            "===============".to_string(),
            format!("Total samples: {}", self.height()),
            format!("Features: {}", self.features.len()),
            format!("Target: {}", self.target),
        ]
        .join("\n");
        std::fs::write(dir.join("data_summary.txt"), summary + "\n")?;

        info!(path = %data_path.display(), rows = self.height(), "Wrote processed data");
        Ok(data_path)
    }
}

/// Builds feature frames from raw trip files
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Load every raw file of the dataset and build the feature frame.
    pub fn build(&self, raw: &RawDataset) -> Result<FeatureFrame> {
        let df = DataLoader::new().load_many(raw.files(), raw.format())?;
        info!(
            rows = df.height(),
            files = raw.files().len(),
            provenance = %raw.provenance(),
            "Loaded raw data"
        );
        self.build_from_frame(&df)
    }

    /// Build the feature frame from an in-memory raw table.
    pub fn build_from_frame(&self, raw: &DataFrame) -> Result<FeatureFrame> {
        let sampled = self.sample(raw)?;

        let cleaned = clean_trips(&sampled)?;
        if cleaned.height() == 0 {
            return Err(TripcastError::DataQualityError(
                "No rows left after range filtering.".to_string(),
            ));
        }

        let engineered = engineer_features(&cleaned)?;
        let (frame, features) = select_features(&engineered)?;
        if frame.height() == 0 {
            return Err(TripcastError::DataQualityError(
                "No complete rows left after feature selection.".to_string(),
            ));
        }

        info!(
            rows = frame.height(),
            features = features.len(),
            "Built feature frame"
        );
        Ok(FeatureFrame {
            frame,
            features,
            target: TARGET_COLUMN.to_string(),
        })
    }

    fn sample(&self, df: &DataFrame) -> Result<DataFrame> {
        let n = match self.config.sample_size {
            Some(n) if n < df.height() => n,
            _ => return Ok(df.clone()),
        };

        let mut indices: Vec<IdxSize> = (0..df.height() as IdxSize).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.sample_seed);
        indices.shuffle(&mut rng);
        indices.truncate(n);
        indices.sort_unstable();

        let idx = IdxCa::from_vec("idx".into(), indices);
        debug!(sampled = n, "Sampled raw records");
        Ok(df.take(&idx)?)
    }
}
