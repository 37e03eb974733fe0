//! Timestamp parsing, target derivation and range filtering

use super::engineering::{
    FARE_AMOUNT_RANGE, PASSENGER_COUNT_RANGE, TRIP_DISTANCE_RANGE, TRIP_DURATION_RANGE,
};
use super::{PICKUP_EPOCH_MS, TARGET_COLUMN};
use crate::error::{Result, TripcastError};
use crate::utils::{f64_values, has_column};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use tracing::debug;

/// Known (pickup, dropoff) column pairs: yellow, green and for-hire vehicles
pub const TIMESTAMP_COLUMNS: [(&str, &str); 3] = [
    ("tpep_pickup_datetime", "tpep_dropoff_datetime"),
    ("lpep_pickup_datetime", "lpep_dropoff_datetime"),
    ("pickup_datetime", "dropOff_datetime"),
];

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Find the pickup/dropoff column pair present in `df`.
pub fn timestamp_columns(df: &DataFrame) -> Result<(&'static str, &'static str)> {
    TIMESTAMP_COLUMNS
        .iter()
        .copied()
        .find(|(pickup, dropoff)| has_column(df, pickup) && has_column(df, dropoff))
        .ok_or_else(|| {
            TripcastError::ConfigurationError(
                "Missing pickup/dropoff datetime columns.".to_string(),
            )
        })
}

/// Parse one timestamp string; `None` when no known layout matches.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Read a timestamp column stored either as text or as a native datetime.
pub fn timestamp_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let column = df
        .column(name)
        .map_err(|_| TripcastError::FeatureNotFound(name.to_string()))?;

    match column.dtype() {
        DataType::String => Ok(column
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_timestamp))
            .collect()),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let physical = column.cast(&DataType::Int64)?;
            Ok(physical
                .as_materialized_series()
                .i64()?
                .into_iter()
                .map(|v| v.and_then(|raw| from_epoch(raw, unit)))
                .collect())
        }
        other => Err(TripcastError::ConfigurationError(format!(
            "Column '{}' has unsupported timestamp type {}",
            name, other
        ))),
    }
}

fn from_epoch(raw: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(raw)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(raw),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(raw),
    };
    dt.map(|d| d.naive_utc())
}

/// Derive `trip_duration` and drop rows outside the plausible ranges.
///
/// Range filters only apply to columns present in the source; a row failing any
/// present filter (including a missing value in a filtered column) is dropped.
/// The normalized pickup time is kept as `pickup_epoch_ms` for the feature step.
pub fn clean_trips(df: &DataFrame) -> Result<DataFrame> {
    debug!(rows = df.height(), "Cleaning data");
    let (pickup_col, dropoff_col) = timestamp_columns(df)?;
    let pickups = timestamp_values(df, pickup_col)?;
    let dropoffs = timestamp_values(df, dropoff_col)?;

    let durations: Vec<Option<f64>> = pickups
        .iter()
        .zip(dropoffs.iter())
        .map(|(p, d)| match (p, d) {
            (Some(p), Some(d)) => Some((*d - *p).num_milliseconds() as f64 / 1000.0),
            _ => None,
        })
        .collect();
    let pickup_ms: Vec<Option<i64>> = pickups
        .iter()
        .map(|p| p.map(|t| t.and_utc().timestamp_millis()))
        .collect();

    let mut frame = df.clone();
    frame.with_column(Series::new(TARGET_COLUMN.into(), durations.clone()))?;
    frame.with_column(Series::new(PICKUP_EPOCH_MS.into(), pickup_ms))?;

    let mut keep = vec![true; frame.height()];
    let filters = [
        ("passenger_count", PASSENGER_COUNT_RANGE),
        ("trip_distance", TRIP_DISTANCE_RANGE),
        ("fare_amount", FARE_AMOUNT_RANGE),
    ];

    for (name, range) in filters {
        if !has_column(&frame, name) {
            continue;
        }
        let values = f64_values(&frame, name)?;
        apply_range(&mut keep, &values, range, name);
    }
    apply_range(&mut keep, &durations, TRIP_DURATION_RANGE, TARGET_COLUMN);

    let mask = BooleanChunked::new("keep".into(), keep.as_slice());
    Ok(frame.filter(&mask)?)
}

fn apply_range(keep: &mut [bool], values: &[Option<f64>], (lo, hi): (f64, f64), name: &str) {
    let before = keep.iter().filter(|k| **k).count();
    for (k, v) in keep.iter_mut().zip(values) {
        *k = *k && matches!(v, Some(x) if *x >= lo && *x <= hi);
    }
    let after = keep.iter().filter(|k| **k).count();
    debug!(filter = name, before, after, "Range filter");
}
