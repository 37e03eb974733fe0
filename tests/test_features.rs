//! Integration tests: raw trip files to a feature frame

use std::path::{Path, PathBuf};

use tripcast::features::{FeatureBuilder, FeatureConfig, FeatureFrame, TARGET_COLUMN};
use tripcast::source::{Provenance, RawDataset};
use tripcast::utils::{f64_values, DataFormat};
use tripcast::{ErrorCategory, TripcastError};

const HEADER: &str = "tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,fare_amount,PULocationID,DOLocationID";

fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    std::fs::write(&path, body).unwrap();
    path
}

fn three_trips(dir: &Path) -> RawDataset {
    let path = write_csv(
        dir,
        "trips.csv",
        &[
            "2024-01-01 08:00:00,2024-01-01 08:10:00,1,2.5,12.5,132,138",
            "2024-01-02 17:30:00,2024-01-02 17:50:00,2,5.0,20.0,140,161",
            "2024-01-06 12:00:00,2024-01-06 12:05:00,1,1.0,6.0,100,101",
        ],
    );
    RawDataset::new(vec![path], DataFormat::Csv, Provenance::Cached)
}

fn column(frame: &FeatureFrame, name: &str) -> Vec<Option<f64>> {
    f64_values(frame.frame(), name).unwrap()
}

#[test]
fn test_three_valid_trips_are_retained() {
    let dir = tempfile::tempdir().unwrap();
    let raw = three_trips(dir.path());

    // 1. Build
    let result = FeatureBuilder::default().build(&raw);
    assert!(result.is_ok(), "Feature build failed: {:?}", result.err());
    let frame = result.unwrap();

    // 2. Every row is inside every range filter
    assert_eq!(frame.height(), 3);
    assert_eq!(frame.target(), TARGET_COLUMN);

    // 3. Derived columns are populated
    for name in ["speed_mph", "pickup_hour", "is_rush_hour"] {
        assert!(frame.features().iter().any(|f| f == name), "missing feature {}", name);
        assert!(column(&frame, name).iter().all(Option::is_some), "null in {}", name);
    }

    // 4. Values
    assert_eq!(
        column(&frame, TARGET_COLUMN),
        vec![Some(600.0), Some(1200.0), Some(300.0)]
    );
    assert_eq!(
        column(&frame, "pickup_hour"),
        vec![Some(8.0), Some(17.0), Some(12.0)]
    );
    assert_eq!(
        column(&frame, "is_rush_hour"),
        vec![Some(1.0), Some(1.0), Some(0.0)]
    );
    assert_eq!(
        column(&frame, "pickup_is_weekend"),
        vec![Some(0.0), Some(0.0), Some(1.0)]
    );
    assert_eq!(
        column(&frame, "is_airport_pickup"),
        vec![Some(1.0), Some(0.0), Some(0.0)]
    );
    assert_eq!(
        column(&frame, "is_airport_dropoff"),
        vec![Some(1.0), Some(1.0), Some(0.0)]
    );

    let speeds: Vec<f64> = column(&frame, "speed_mph").into_iter().flatten().collect();
    for (got, want) in speeds.iter().zip([15.0, 15.0, 12.0]) {
        assert!((got - want).abs() < 1e-9, "speed {} != {}", got, want);
    }
}

#[test]
fn test_feature_list_follows_allow_list_order() {
    let dir = tempfile::tempdir().unwrap();
    let frame = FeatureBuilder::default().build(&three_trips(dir.path())).unwrap();

    let expected = [
        "trip_distance",
        "passenger_count",
        "pickup_hour",
        "pickup_weekday",
        "pickup_is_weekend",
        "is_rush_hour",
        "speed_mph",
        "PULocationID",
        "DOLocationID",
        "is_airport_pickup",
        "is_airport_dropoff",
    ];
    assert_eq!(frame.features(), expected.map(String::from).as_slice());

    // Categorical buckets and fare never reach the model
    let names: Vec<String> = frame
        .frame()
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert!(!names.iter().any(|n| n == "fare_amount"));
    assert!(!names.iter().any(|n| n == "hour_category"));
    assert_eq!(names.last().map(String::as_str), Some(TARGET_COLUMN));
}

#[test]
fn test_duration_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bounds.csv");
    std::fs::write(
        &path,
        "tpep_pickup_datetime,tpep_dropoff_datetime,trip_distance\n\
         2024-01-03 10:00:00,2024-01-03 10:00:29,1.0\n\
         2024-01-03 10:00:00,2024-01-03 10:00:30,1.0\n\
         2024-01-03 10:00:00,2024-01-03 13:00:00,1.0\n\
         2024-01-03 10:00:00,2024-01-03 13:00:01,1.0\n",
    )
    .unwrap();
    let raw = RawDataset::new(vec![path], DataFormat::Csv, Provenance::Cached);

    let frame = FeatureBuilder::default().build(&raw).unwrap();

    // 30 s and 10800 s are inclusive bounds
    assert_eq!(
        column(&frame, TARGET_COLUMN),
        vec![Some(30.0), Some(10800.0)]
    );

    // One mile in 30 s is clamped
    let speeds = column(&frame, "speed_mph");
    assert_eq!(speeds[0], Some(100.0));
    for speed in speeds.into_iter().flatten() {
        assert!((0.0..=100.0).contains(&speed));
    }

    // Absent source columns produce no features
    assert!(!frame.features().iter().any(|f| f == "passenger_count"));
    assert!(!frame.features().iter().any(|f| f == "is_airport_pickup"));
}

#[test]
fn test_out_of_range_rows_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "mixed.csv",
        &[
            "2024-01-01 08:00:00,2024-01-01 08:10:00,0,2.5,12.5,132,138",
            "2024-01-01 08:00:00,2024-01-01 08:10:00,1,150.0,12.5,132,138",
            "2024-01-01 08:00:00,2024-01-01 08:10:00,1,2.5,0.0,132,138",
            "2024-01-01 08:00:00,2024-01-01 08:10:00,9,2.5,12.5,132,138",
            "2024-01-01 09:00:00,2024-01-01 09:15:00,3,4.0,18.0,50,60",
        ],
    );
    let raw = RawDataset::new(vec![path], DataFormat::Csv, Provenance::Cached);

    let frame = FeatureBuilder::default().build(&raw).unwrap();
    assert_eq!(frame.height(), 1);
    assert_eq!(column(&frame, "passenger_count"), vec![Some(3.0)]);
}

#[test]
fn test_all_rows_filtered_is_a_data_quality_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "bad.csv",
        &["2024-01-01 08:00:00,2024-01-01 08:00:05,1,2.5,12.5,132,138"],
    );
    let raw = RawDataset::new(vec![path], DataFormat::Csv, Provenance::Cached);

    let err = FeatureBuilder::default().build(&raw).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::DataQuality);
}

#[test]
fn test_multiple_files_are_concatenated() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_csv(
        dir.path(),
        "a.csv",
        &["2024-01-01 08:00:00,2024-01-01 08:10:00,1,2.5,12.5,132,138"],
    );
    let b = write_csv(
        dir.path(),
        "b.csv",
        &["2024-01-02 17:30:00,2024-01-02 17:50:00,2,5.0,20.0,140,161"],
    );
    let raw = RawDataset::new(vec![a, b], DataFormat::Csv, Provenance::Cached);

    let frame = FeatureBuilder::default().build(&raw).unwrap();
    assert_eq!(frame.height(), 2);
}

#[test]
fn test_mixed_formats_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(
        dir.path(),
        "a.csv",
        &["2024-01-01 08:00:00,2024-01-01 08:10:00,1,2.5,12.5,132,138"],
    );
    let parquet = dir.path().join("b.parquet");
    let raw = RawDataset::new(vec![csv, parquet], DataFormat::Csv, Provenance::Cached);

    let err = FeatureBuilder::default().build(&raw).unwrap_err();
    assert!(matches!(err, TripcastError::ConfigurationError(_)), "got {:?}", err);
}

#[test]
fn test_sampling_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<String> = (0..40)
        .map(|i| {
            format!(
                "2024-01-{:02} {:02}:00:00,2024-01-{:02} {:02}:20:00,1,{}.5,15.0,{},{}",
                1 + i % 28,
                i % 24,
                1 + i % 28,
                i % 24,
                1 + i % 9,
                100 + i,
                200 + i
            )
        })
        .collect();
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let path = write_csv(dir.path(), "many.csv", &rows);
    let raw = RawDataset::new(vec![path], DataFormat::Csv, Provenance::Cached);

    let builder = FeatureBuilder::new(FeatureConfig::default().with_sample_size(Some(10)));
    let first = builder.build(&raw).unwrap();
    let second = builder.build(&raw).unwrap();

    assert_eq!(first.height(), 10);
    assert_eq!(
        column(&first, "PULocationID"),
        column(&second, "PULocationID")
    );
}

#[test]
fn test_written_frame_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let frame = FeatureBuilder::default().build(&three_trips(dir.path())).unwrap();

    let out = dir.path().join("processed");
    let data_path = frame.write(&out, DataFormat::Parquet).unwrap();
    assert!(data_path.ends_with("processed_data.parquet"));
    assert!(out.join("features.txt").exists());
    assert!(out.join("data_summary.txt").exists());

    let reloaded = FeatureFrame::load(&data_path, TARGET_COLUMN).unwrap();
    assert_eq!(reloaded.height(), 3);
    assert_eq!(reloaded.features(), frame.features());
}
