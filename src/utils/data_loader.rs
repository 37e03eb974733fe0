//! Tabular data loading and saving
//!
//! Format detection is an explicit, pure mapping from a path's extension to a
//! [`DataFormat`]; unknown extensions are configuration errors rather than guesses.

use crate::error::{Result, TripcastError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Number of rows polars samples when inferring a CSV schema
const CSV_INFER_SCHEMA_ROWS: usize = 10_000;

/// Supported on-disk tabular formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Comma-delimited text with a header row
    Csv,
    /// Apache Parquet columnar files
    Parquet,
}

impl DataFormat {
    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Csv => "csv",
            DataFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DataFormat {
    type Err = TripcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(DataFormat::Csv),
            "parquet" => Ok(DataFormat::Parquet),
            other => Err(TripcastError::ConfigurationError(format!(
                "Unsupported data format: {}",
                other
            ))),
        }
    }
}

/// Infer the data format of `path` from its extension.
pub fn infer_format(path: &Path) -> Result<DataFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| {
            TripcastError::ConfigurationError(format!(
                "Cannot infer format from {}",
                path.display()
            ))
        })?;

    match ext.as_str() {
        "csv" => Ok(DataFormat::Csv),
        "parquet" => Ok(DataFormat::Parquet),
        other => Err(TripcastError::ConfigurationError(format!(
            "Unsupported file extension '.{}' for {}",
            other,
            path.display()
        ))),
    }
}

/// List the files in `dir` whose extension maps to `format`, sorted by path.
pub fn list_data_files(dir: &Path, format: DataFormat) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && matches!(infer_format(p), Ok(f) if f == format))
        .collect();
    files.sort();
    Ok(files)
}

/// Data loader for the supported formats
#[derive(Debug, Clone, Default)]
pub struct DataLoader;

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(CSV_INFER_SCHEMA_ROWS))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .map_err(|e| TripcastError::DataError(format!("{}: {}", path.display(), e)))?
            .finish()
            .map_err(|e| TripcastError::DataError(format!("{}: {}", path.display(), e)))
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;

        ParquetReader::new(file)
            .finish()
            .map_err(|e| TripcastError::DataError(format!("{}: {}", path.display(), e)))
    }

    /// Load a single file in the given format
    pub fn load(&self, path: &Path, format: DataFormat) -> Result<DataFrame> {
        if !path.exists() {
            return Err(TripcastError::ConfigurationError(format!(
                "Data file not found: {}",
                path.display()
            )));
        }
        match format {
            DataFormat::Csv => self.load_csv(path),
            DataFormat::Parquet => self.load_parquet(path),
        }
    }

    /// Detect the format from the extension and load
    pub fn load_auto(&self, path: &Path) -> Result<DataFrame> {
        let format = infer_format(path)?;
        self.load(path, format)
    }

    /// Load every file and stack them into one frame.
    ///
    /// All files must carry `format`'s extension; mixing formats is rejected
    /// before any file is read.
    pub fn load_many(&self, files: &[PathBuf], format: DataFormat) -> Result<DataFrame> {
        if files.is_empty() {
            return Err(TripcastError::ConfigurationError(
                "No input files found.".to_string(),
            ));
        }

        for path in files {
            let detected = infer_format(path)?;
            if detected != format {
                return Err(TripcastError::ConfigurationError(format!(
                    "Mixed input formats: expected {} but {} is {}",
                    format,
                    path.display(),
                    detected
                )));
            }
        }

        debug!(files = files.len(), format = %format, "Loading raw files");

        let mut combined: Option<DataFrame> = None;
        for path in files {
            let df = self.load(path, format)?;
            combined = Some(match combined {
                None => df,
                Some(mut acc) => {
                    acc.vstack_mut(&df).map_err(|e| {
                        TripcastError::ConfigurationError(format!(
                            "Schema of {} does not match earlier files: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    acc
                }
            });
        }

        combined
            .ok_or_else(|| TripcastError::ConfigurationError("No input files found.".to_string()))
    }
}

/// Save DataFrames to the supported formats
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| TripcastError::DataError(e.to_string()))
    }

    /// Save to Parquet
    pub fn save_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
        let file = File::create(path)?;

        ParquetWriter::new(file)
            .finish(df)
            .map_err(|e| TripcastError::DataError(e.to_string()))?;

        Ok(())
    }

    /// Save in the given format, creating parent directories as needed
    pub fn save(df: &mut DataFrame, path: &Path, format: DataFormat) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match format {
            DataFormat::Csv => Self::save_csv(df, path),
            DataFormat::Parquet => Self::save_parquet(df, path),
        }
    }
}
