//! Deterministic synthetic trip records
//!
//! Used when no cached files exist and downloading is not permitted. The schema
//! mirrors the yellow-cab files so the rest of the pipeline cannot tell the
//! difference, and the fixed seed makes every generated file byte-identical.

use crate::error::{Result, TripcastError};
use crate::utils::{DataFormat, DataLoader, DataSaver};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Row count of the synthetic dataset
pub const SYNTHETIC_ROWS: usize = 1000;

/// Seed of the synthetic generator
pub const SYNTHETIC_SEED: u64 = 42;

/// File name the synthetic dataset is written to
pub const SYNTHETIC_FILE_NAME: &str = "synthetic_tripdata.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_ZONE_ID: i64 = 265;

/// Generate `n_rows` synthetic trips with the given seed.
pub fn generate_trips(n_rows: usize, seed: u64) -> Result<DataFrame> {
    let base: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TripcastError::DataError("invalid synthetic base date".to_string()))?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let passenger_choices = [1i64, 2, 3, 4];

    let mut pickups = Vec::with_capacity(n_rows);
    let mut dropoffs = Vec::with_capacity(n_rows);
    let mut passengers = Vec::with_capacity(n_rows);
    let mut distances = Vec::with_capacity(n_rows);
    let mut pu_zones = Vec::with_capacity(n_rows);
    let mut do_zones = Vec::with_capacity(n_rows);
    let mut fares = Vec::with_capacity(n_rows);

    for _ in 0..n_rows {
        let offset = rng.gen_range(0..=30) * 86_400
            + rng.gen_range(0..=23) * 3_600
            + rng.gen_range(0..=59) * 60
            + rng.gen_range(0..=59);
        let pickup = base + Duration::seconds(offset);

        let distance = round2(rng.gen_range(0.1..30.0));
        // Duration follows distance through a noisy average speed
        let speed_mph: f64 = rng.gen_range(8.0..30.0);
        let seconds = ((distance / speed_mph) * 3600.0 + rng.gen_range(60.0..300.0))
            .clamp(120.0, 7200.0)
            .round() as i64;
        let dropoff = pickup + Duration::seconds(seconds);

        let fare = round2(2.50 + distance * 2.0 + rng.gen_range(0.0..5.0));

        pickups.push(pickup.format(TIMESTAMP_FORMAT).to_string());
        dropoffs.push(dropoff.format(TIMESTAMP_FORMAT).to_string());
        passengers.push(*passenger_choices.choose(&mut rng).unwrap_or(&1));
        distances.push(distance);
        pu_zones.push(rng.gen_range(1..=MAX_ZONE_ID));
        do_zones.push(rng.gen_range(1..=MAX_ZONE_ID));
        fares.push(fare);
    }

    let df = DataFrame::new(vec![
        Column::new("tpep_pickup_datetime".into(), pickups),
        Column::new("tpep_dropoff_datetime".into(), dropoffs),
        Column::new("passenger_count".into(), passengers),
        Column::new("trip_distance".into(), distances),
        Column::new("PULocationID".into(), pu_zones),
        Column::new("DOLocationID".into(), do_zones),
        Column::new("fare_amount".into(), fares),
    ])?;

    Ok(df)
}

/// Write the synthetic dataset into `dir`.
///
/// An existing file is reused when it holds `n_rows` rows. The seed is not
/// recorded in the file, so a file written with another seed but the same row
/// count is reused as is.
pub fn write_synthetic(dir: &Path, n_rows: usize, seed: u64) -> Result<PathBuf> {
    let path = dir.join(SYNTHETIC_FILE_NAME);
    if path.exists() {
        match DataLoader::new().load_csv(&path) {
            Ok(existing) if existing.height() == n_rows => return Ok(path),
            Ok(existing) => warn!(
                found = existing.height(),
                expected = n_rows,
                path = %path.display(),
                "Synthetic dataset has a different row count, regenerating"
            ),
            Err(e) => warn!(
                error = %e,
                path = %path.display(),
                "Unreadable synthetic dataset, regenerating"
            ),
        }
    }

    let mut df = generate_trips(n_rows, seed)?;
    DataSaver::save(&mut df, &path, DataFormat::Csv)?;
    info!(rows = n_rows, path = %path.display(), "Wrote synthetic dataset");
    Ok(path)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_trips_shape() {
        let df = generate_trips(50, SYNTHETIC_SEED).unwrap();
        assert_eq!(df.height(), 50);
        assert_eq!(df.width(), 7);
        assert!(df.column("tpep_pickup_datetime").is_ok());
    }

    #[test]
    fn test_generate_trips_is_deterministic() {
        let a = generate_trips(100, 7).unwrap();
        let b = generate_trips(100, 7).unwrap();
        assert!(a.equals(&b));

        let c = generate_trips(100, 8).unwrap();
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_generated_values_in_range() {
        let df = generate_trips(200, SYNTHETIC_SEED).unwrap();
        let distance = df.column("trip_distance").unwrap().f64().unwrap();
        assert!(distance.into_iter().flatten().all(|d| (0.1..=30.0).contains(&d)));

        let passengers = df.column("passenger_count").unwrap().i64().unwrap();
        assert!(passengers.into_iter().flatten().all(|p| (1..=4).contains(&p)));
    }

    #[test]
    fn test_write_synthetic_reuses_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_synthetic(dir.path(), 40, SYNTHETIC_SEED).unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        let again = write_synthetic(dir.path(), 40, SYNTHETIC_SEED).unwrap();
        assert_eq!(again, path);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_write_synthetic_regenerates_on_row_count_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_synthetic(dir.path(), 40, SYNTHETIC_SEED).unwrap();

        write_synthetic(dir.path(), 25, SYNTHETIC_SEED).unwrap();
        let df = DataLoader::new().load_csv(&path).unwrap();
        assert_eq!(df.height(), 25);
    }

    #[test]
    fn test_write_synthetic_replaces_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SYNTHETIC_FILE_NAME);
        std::fs::write(&path, "").unwrap();

        write_synthetic(dir.path(), 10, SYNTHETIC_SEED).unwrap();
        let df = DataLoader::new().load_csv(&path).unwrap();
        assert_eq!(df.height(), 10);
    }
}
