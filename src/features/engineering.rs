//! Derived trip features and the model feature allow-list

use super::{PICKUP_EPOCH_MS, TARGET_COLUMN};
use crate::error::{Result, TripcastError};
use crate::utils::{f64_values, has_column};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use polars::prelude::*;
use tracing::debug;

/// Inclusive range of plausible passenger counts
pub const PASSENGER_COUNT_RANGE: (f64, f64) = (1.0, 8.0);
/// Inclusive range of plausible trip distances, in miles
pub const TRIP_DISTANCE_RANGE: (f64, f64) = (0.01, 100.0);
/// Inclusive range of plausible fares, in dollars
pub const FARE_AMOUNT_RANGE: (f64, f64) = (0.01, 1000.0);
/// Inclusive range of plausible trip durations, in seconds
pub const TRIP_DURATION_RANGE: (f64, f64) = (30.0, 10800.0);

/// Pickup hours counted as rush hour
pub const RUSH_HOURS: [u32; 6] = [7, 8, 9, 17, 18, 19];
/// Taxi zones of JFK, LaGuardia and Newark-adjacent pickups
pub const AIRPORT_ZONE_IDS: [i64; 3] = [132, 138, 161];
/// Upper edges (inclusive) of the Short/Medium/Long distance buckets, in miles
pub const DISTANCE_BREAKPOINTS: [f64; 3] = [2.0, 5.0, 10.0];
/// Average speeds are clamped to `[0, MAX_SPEED_MPH]`
pub const MAX_SPEED_MPH: f64 = 100.0;

pub const PICKUP_ZONE_COLUMN: &str = "PULocationID";
pub const DROPOFF_ZONE_COLUMN: &str = "DOLocationID";

/// Candidate model inputs, in output order; absent ones are skipped
pub const FEATURE_ALLOW_LIST: [&str; 11] = [
    "trip_distance",
    "passenger_count",
    "pickup_hour",
    "pickup_weekday",
    "pickup_is_weekend",
    "is_rush_hour",
    "speed_mph",
    PICKUP_ZONE_COLUMN,
    DROPOFF_ZONE_COLUMN,
    "is_airport_pickup",
    "is_airport_dropoff",
];

/// Coarse time-of-day bucket over half-open hour ranges
pub fn hour_category(hour: u32) -> &'static str {
    match hour {
        0..=5 => "Night",
        6..=11 => "Morning",
        12..=17 => "Afternoon",
        _ => "Evening",
    }
}

/// Coarse distance bucket; each breakpoint belongs to the lower bucket
pub fn distance_category(miles: f64) -> &'static str {
    let [short, medium, long] = DISTANCE_BREAKPOINTS;
    if miles <= short {
        "Short"
    } else if miles <= medium {
        "Medium"
    } else if miles <= long {
        "Long"
    } else {
        "Very_Long"
    }
}

/// Average speed in mph, rounded to cents and clamped to `[0, MAX_SPEED_MPH]`
pub fn speed_mph(distance_miles: f64, duration_secs: f64) -> Option<f64> {
    if duration_secs <= 0.0 {
        return None;
    }
    let speed = distance_miles / (duration_secs / 3600.0);
    if !speed.is_finite() {
        return None;
    }
    Some(((speed * 100.0).round() / 100.0).clamp(0.0, MAX_SPEED_MPH))
}

pub fn is_rush_hour(hour: u32) -> bool {
    RUSH_HOURS.contains(&hour)
}

pub fn is_airport_zone(zone: Option<f64>) -> bool {
    zone.map_or(false, |z| AIRPORT_ZONE_IDS.iter().any(|&id| id as f64 == z))
}

/// Add calendar, bucket, speed, airport and rush-hour features to a cleaned frame.
///
/// `trip_distance` is mandatory (speed and distance bucket depend on it); zone
/// columns are optional and their airport flags are simply not produced when absent.
pub fn engineer_features(df: &DataFrame) -> Result<DataFrame> {
    debug!(rows = df.height(), "Engineering features");

    if !has_column(df, "trip_distance") {
        return Err(TripcastError::ConfigurationError(
            "Missing trip_distance column required for speed and distance features.".to_string(),
        ));
    }

    let pickups: Vec<Option<NaiveDateTime>> = df
        .column(PICKUP_EPOCH_MS)
        .map_err(|_| TripcastError::FeatureNotFound(PICKUP_EPOCH_MS.to_string()))?
        .as_materialized_series()
        .i64()?
        .into_iter()
        .map(|v| v.and_then(DateTime::from_timestamp_millis).map(|d| d.naive_utc()))
        .collect();
    let distances = f64_values(df, "trip_distance")?;
    let durations = f64_values(df, TARGET_COLUMN)?;

    let hours: Vec<Option<u32>> = pickups.iter().map(|p| p.map(|t| t.hour())).collect();
    let weekdays: Vec<Option<u32>> = pickups
        .iter()
        .map(|p| p.map(|t| t.weekday().num_days_from_monday()))
        .collect();

    let pickup_hour: Vec<Option<i32>> = hours.iter().map(|h| h.map(|h| h as i32)).collect();
    let pickup_weekday: Vec<Option<i32>> = weekdays.iter().map(|w| w.map(|w| w as i32)).collect();
    let pickup_is_weekend: Vec<Option<i32>> = weekdays
        .iter()
        .map(|w| w.map(|w| i32::from(w >= 5)))
        .collect();
    let hour_bucket: Vec<Option<&str>> = hours.iter().map(|h| h.map(hour_category)).collect();
    let distance_bucket: Vec<Option<&str>> =
        distances.iter().map(|d| d.map(distance_category)).collect();
    let speed: Vec<Option<f64>> = distances
        .iter()
        .zip(durations.iter())
        .map(|(d, t)| match (d, t) {
            (Some(d), Some(t)) => speed_mph(*d, *t),
            _ => None,
        })
        .collect();
    let rush: Vec<Option<i32>> = hours
        .iter()
        .map(|h| h.map(|h| i32::from(is_rush_hour(h))))
        .collect();

    let mut frame = df.clone();
    frame.with_column(Series::new("pickup_hour".into(), pickup_hour))?;
    frame.with_column(Series::new("pickup_weekday".into(), pickup_weekday))?;
    frame.with_column(Series::new("pickup_is_weekend".into(), pickup_is_weekend))?;
    frame.with_column(Series::new("hour_category".into(), hour_bucket))?;
    frame.with_column(Series::new("distance_category".into(), distance_bucket))?;
    frame.with_column(Series::new("speed_mph".into(), speed))?;

    for (zone_col, flag_col) in [
        (PICKUP_ZONE_COLUMN, "is_airport_pickup"),
        (DROPOFF_ZONE_COLUMN, "is_airport_dropoff"),
    ] {
        if has_column(df, zone_col) {
            let flags: Vec<i32> = f64_values(df, zone_col)?
                .into_iter()
                .map(|z| i32::from(is_airport_zone(z)))
                .collect();
            frame.with_column(Series::new(flag_col.into(), flags))?;
        }
    }

    frame.with_column(Series::new("is_rush_hour".into(), rush))?;
    Ok(frame)
}

/// Keep the allow-listed features that exist plus the target, dropping rows with
/// any missing value among them. Returns the frame and the feature names used.
pub fn select_features(df: &DataFrame) -> Result<(DataFrame, Vec<String>)> {
    let features: Vec<String> = FEATURE_ALLOW_LIST
        .iter()
        .filter(|name| has_column(df, name))
        .map(|name| name.to_string())
        .collect();

    let mut selected = features.clone();
    selected.push(TARGET_COLUMN.to_string());
    let model_df = df.select(selected.iter().map(|s| s.as_str()))?;

    let mut keep = vec![true; model_df.height()];
    for name in &selected {
        let values = f64_values(&model_df, name)?;
        for (k, v) in keep.iter_mut().zip(values) {
            *k = *k && v.is_some();
        }
    }
    let mask = BooleanChunked::new("keep".into(), keep.as_slice());
    let model_df = model_df.filter(&mask)?;

    debug!(
        features = features.len(),
        rows = model_df.height(),
        "Selected features"
    );
    Ok((model_df, features))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_category_edges() {
        assert_eq!(hour_category(0), "Night");
        assert_eq!(hour_category(5), "Night");
        assert_eq!(hour_category(6), "Morning");
        assert_eq!(hour_category(12), "Afternoon");
        assert_eq!(hour_category(17), "Afternoon");
        assert_eq!(hour_category(18), "Evening");
        assert_eq!(hour_category(23), "Evening");
    }

    #[test]
    fn test_distance_category_edges() {
        assert_eq!(distance_category(0.5), "Short");
        assert_eq!(distance_category(2.0), "Short");
        assert_eq!(distance_category(2.01), "Medium");
        assert_eq!(distance_category(10.0), "Long");
        assert_eq!(distance_category(42.0), "Very_Long");
    }

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(speed_mph(2.5, 600.0), Some(15.0));
        assert_eq!(speed_mph(100.0, 60.0), Some(MAX_SPEED_MPH));
        assert_eq!(speed_mph(1.0, 0.0), None);
    }

    #[test]
    fn test_rush_hour_and_airports() {
        assert!(is_rush_hour(8));
        assert!(is_rush_hour(19));
        assert!(!is_rush_hour(10));
        assert!(is_airport_zone(Some(138.0)));
        assert!(!is_airport_zone(Some(140.0)));
        assert!(!is_airport_zone(None));
    }

    #[test]
    fn test_select_features_skips_absent_columns() {
        let df = df!(
            "trip_distance" => &[1.0, 2.0],
            "speed_mph" => &[Some(10.0), None],
            "hour_category" => &["Night", "Night"],
            TARGET_COLUMN => &[300.0, 600.0]
        )
        .unwrap();

        let (model_df, features) = select_features(&df).unwrap();
        assert_eq!(features, vec!["trip_distance", "speed_mph"]);
        assert_eq!(model_df.height(), 1);
        assert_eq!(model_df.width(), 3);
    }
}
