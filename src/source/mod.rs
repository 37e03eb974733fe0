//! Raw data resolution
//!
//! Decides where the working raw dataset comes from, in priority order:
//! 1. supported files already present in the target directory (`cached`)
//! 2. monthly files fetched over HTTP when downloading is permitted (`downloaded`)
//! 3. a deterministic synthetic dataset (`synthetic`)

pub mod download;
pub mod synthetic;

pub use download::{data_url, resolve_months, Fetcher, HttpFetcher, NYC_TAXI_BASE_URL};
pub use synthetic::{generate_trips, write_synthetic, SYNTHETIC_FILE_NAME, SYNTHETIC_ROWS};

use crate::error::{Result, TripcastError};
use crate::utils::{list_data_files, DataFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Origin of a raw dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cached,
    Downloaded,
    Synthetic,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provenance::Cached => "cached",
            Provenance::Downloaded => "downloaded",
            Provenance::Synthetic => "synthetic",
        };
        f.write_str(s)
    }
}

/// One or more homogeneous raw files plus where they came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDataset {
    files: Vec<PathBuf>,
    format: DataFormat,
    provenance: Provenance,
}

impl RawDataset {
    pub fn new(files: Vec<PathBuf>, format: DataFormat, provenance: Provenance) -> Self {
        Self {
            files,
            format,
            provenance,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }
}

/// Trip record families published by the TLC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripDataType {
    #[serde(rename = "yellow_tripdata")]
    Yellow,
    #[serde(rename = "green_tripdata")]
    Green,
    #[serde(rename = "fhv_tripdata")]
    Fhv,
}

impl TripDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripDataType::Yellow => "yellow_tripdata",
            TripDataType::Green => "green_tripdata",
            TripDataType::Fhv => "fhv_tripdata",
        }
    }
}

impl FromStr for TripDataType {
    type Err = TripcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "yellow_tripdata" | "yellow" => Ok(TripDataType::Yellow),
            "green_tripdata" | "green" => Ok(TripDataType::Green),
            "fhv_tripdata" | "fhv" => Ok(TripDataType::Fhv),
            other => Err(TripcastError::ConfigurationError(format!(
                "Unknown data type: {}",
                other
            ))),
        }
    }
}

/// Settings for [`SourceResolver`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub data_type: TripDataType,
    pub year: i32,
    pub months: Vec<u32>,
    /// Request only the first month
    pub sample: bool,
    pub allow_download: bool,
    /// Fetch every requested month again, even when already on disk
    #[serde(default)]
    pub force: bool,
    /// Synthesize instead of failing when a transfer fails
    pub synthetic_fallback: bool,
    /// Restrict cached lookup to one format
    pub input_format: Option<DataFormat>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub synthetic_rows: usize,
    pub synthetic_seed: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_type: TripDataType::Yellow,
            year: 2024,
            months: vec![1, 2, 3],
            sample: false,
            allow_download: false,
            force: false,
            synthetic_fallback: false,
            input_format: None,
            base_url: NYC_TAXI_BASE_URL.to_string(),
            timeout_secs: download::DEFAULT_TIMEOUT_SECS,
            synthetic_rows: SYNTHETIC_ROWS,
            synthetic_seed: synthetic::SYNTHETIC_SEED,
        }
    }
}

impl SourceConfig {
    pub fn with_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_synthetic_fallback(mut self, enabled: bool) -> Self {
        self.synthetic_fallback = enabled;
        self
    }

    pub fn with_months(mut self, year: i32, months: Vec<u32>) -> Self {
        self.year = year;
        self.months = months;
        self
    }

    pub fn with_sample(mut self, sample: bool) -> Self {
        self.sample = sample;
        self
    }

    pub fn with_input_format(mut self, format: Option<DataFormat>) -> Self {
        self.input_format = format;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Resolves the working raw dataset for a directory
pub struct SourceResolver {
    config: SourceConfig,
    fetcher: Box<dyn Fetcher>,
}

impl SourceResolver {
    /// Create a resolver that downloads over HTTP
    pub fn new(config: SourceConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.timeout_secs)?;
        Ok(Self::with_fetcher(config, Box::new(fetcher)))
    }

    /// Create a resolver with a custom transfer implementation
    pub fn with_fetcher(config: SourceConfig, fetcher: Box<dyn Fetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Resolve the raw dataset for `dir`, creating the directory if needed.
    pub fn resolve(&self, dir: &Path) -> Result<RawDataset> {
        std::fs::create_dir_all(dir)?;

        let refetch = self.config.allow_download && self.config.force;
        if let Some(cached) = self.cached(dir)?.filter(|_| !refetch) {
            info!(
                files = cached.files().len(),
                format = %cached.format(),
                dir = %dir.display(),
                "Using cached raw data"
            );
            return Ok(cached);
        }

        if self.config.allow_download {
            match self.download(dir) {
                Ok(dataset) => return Ok(dataset),
                Err(e @ TripcastError::TransferError { .. }) if self.config.synthetic_fallback => {
                    warn!(error = %e, "Download failed, falling back to synthetic data");
                }
                Err(e) => return Err(e),
            }
        }

        self.synthesize(dir)
    }

    /// Supported files already in `dir`; Parquet wins when both formats are present.
    pub fn cached(&self, dir: &Path) -> Result<Option<RawDataset>> {
        let candidates = match self.config.input_format {
            Some(format) => vec![format],
            None => vec![DataFormat::Parquet, DataFormat::Csv],
        };

        for format in candidates {
            let files = list_data_files(dir, format)?;
            if !files.is_empty() {
                return Ok(Some(RawDataset::new(files, format, Provenance::Cached)));
            }
        }
        Ok(None)
    }

    fn download(&self, dir: &Path) -> Result<RawDataset> {
        let months = resolve_months(&self.config.months, self.config.sample)?;
        let data_type = self.config.data_type.as_str();
        let mut files = Vec::with_capacity(months.len());
        let mut fetched = 0usize;

        for month in months {
            let url = data_url(&self.config.base_url, data_type, self.config.year, month);
            let file_name = format!("{}_{}-{:02}.parquet", data_type, self.config.year, month);
            let dest = dir.join(file_name);

            if dest.exists() && !self.config.force {
                debug!(path = %dest.display(), "Skipping existing file");
            } else {
                self.fetcher.fetch(&url, &dest)?;
                fetched += 1;
            }
            files.push(dest);
        }

        info!(
            fetched,
            skipped = files.len() - fetched,
            dir = %dir.display(),
            "Raw data downloaded"
        );
        Ok(RawDataset::new(files, DataFormat::Parquet, Provenance::Downloaded))
    }

    fn synthesize(&self, dir: &Path) -> Result<RawDataset> {
        let path = write_synthetic(dir, self.config.synthetic_rows, self.config.synthetic_seed)?;
        Ok(RawDataset::new(vec![path], DataFormat::Csv, Provenance::Synthetic))
    }
}
