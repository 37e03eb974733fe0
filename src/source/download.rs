//! Fetching monthly trip files over HTTP

use crate::error::{Result, TripcastError};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Public bucket serving the monthly trip record files
pub const NYC_TAXI_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data/";

/// Default per-transfer timeout, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const USER_AGENT: &str = "Mozilla/5.0";

/// Transfers one remote file to a local path.
///
/// Implementations must either leave a complete file at `dest` or return an error
/// without creating `dest`.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP fetcher with a per-transfer timeout
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose transfers fail after `timeout_secs`
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                TripcastError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let transfer_err = |reason: String| TripcastError::TransferError {
            url: url.to_string(),
            reason,
        };

        debug!(url, dest = %dest.display(), "Downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| transfer_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(transfer_err(format!("HTTP status {}", response.status())));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Stream into a sibling .part file so an aborted transfer never looks cached
        let partial = partial_path(dest);
        let written = {
            let mut file = File::create(&partial)?;
            std::io::copy(&mut response, &mut file)
        };
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(transfer_err(e.to_string()));
            }
        };

        std::fs::rename(&partial, dest)?;
        info!(url, bytes, "Downloaded file");
        Ok(())
    }
}

/// `<dest>.part`
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// URL of one monthly file: `{base}{data_type}_{year}-{month:02}.parquet`
pub fn data_url(base_url: &str, data_type: &str, year: i32, month: u32) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{}/{}_{}-{:02}.parquet", base, data_type, year, month)
}

/// Months to request; only the first one in sample mode
pub fn resolve_months(months: &[u32], sample: bool) -> Result<Vec<u32>> {
    let first = *months.first().ok_or_else(|| {
        TripcastError::ConfigurationError("Months list cannot be empty.".to_string())
    })?;
    if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
        return Err(TripcastError::ConfigurationError(format!(
            "Invalid month: {}",
            bad
        )));
    }
    Ok(if sample { vec![first] } else { months.to_vec() })
}
