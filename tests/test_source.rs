//! Integration tests: raw dataset resolution
//!
//! Covers the cached → downloaded → synthetic priority order and the
//! reproducibility of the synthetic fallback.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tripcast::source::{Fetcher, Provenance, SourceConfig, SourceResolver, SYNTHETIC_ROWS};
use tripcast::utils::{DataFormat, DataLoader};
use tripcast::TripcastError;

/// Fetcher that never touches the network
struct FakeFetcher {
    calls: Arc<AtomicUsize>,
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, url: &str, _dest: &Path) -> tripcast::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TripcastError::TransferError {
            url: url.to_string(),
            reason: "offline".to_string(),
        })
    }
}

fn offline_resolver(config: SourceConfig) -> (SourceResolver, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = FakeFetcher {
        calls: Arc::clone(&calls),
    };
    (SourceResolver::with_fetcher(config, Box::new(fetcher)), calls)
}

#[test]
fn test_synthetic_when_download_disallowed() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    let (resolver, calls) = offline_resolver(SourceConfig::default().with_download(false));

    // 1. Missing directory is created, never an error
    let dataset = resolver.resolve(&raw_dir);
    assert!(dataset.is_ok(), "Resolution failed: {:?}", dataset.err());
    let dataset = dataset.unwrap();
    assert!(raw_dir.is_dir());

    // 2. Synthetic provenance with a fixed row count
    assert_eq!(dataset.provenance(), Provenance::Synthetic);
    assert_eq!(dataset.format(), DataFormat::Csv);
    assert_eq!(dataset.files().len(), 1);
    let df = DataLoader::new().load_many(dataset.files(), dataset.format()).unwrap();
    assert_eq!(df.height(), SYNTHETIC_ROWS);

    // 3. No transfer attempted
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_resolution_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (resolver, _) = offline_resolver(SourceConfig::default());

    let first = resolver.resolve(dir.path()).unwrap();
    let bytes = std::fs::read(&first.files()[0]).unwrap();

    // Second run finds the synthesized file and returns it unchanged
    let second = resolver.resolve(dir.path()).unwrap();
    assert_eq!(second.provenance(), Provenance::Cached);
    assert_eq!(second.files(), first.files());
    assert_eq!(std::fs::read(&second.files()[0]).unwrap(), bytes);
}

#[test]
fn test_synthetic_data_is_reproducible() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let (resolver, _) = offline_resolver(SourceConfig::default());

    let first = resolver.resolve(a.path()).unwrap();
    let second = resolver.resolve(b.path()).unwrap();

    assert_eq!(
        std::fs::read(&first.files()[0]).unwrap(),
        std::fs::read(&second.files()[0]).unwrap()
    );
}

#[test]
fn test_partial_download_is_not_cached_data() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("yellow_tripdata_2024-01.parquet.part"), b"PAR").unwrap();
    let (resolver, _) = offline_resolver(SourceConfig::default());

    let dataset = resolver.resolve(dir.path()).unwrap();
    assert_eq!(dataset.provenance(), Provenance::Synthetic);
}

#[test]
fn test_transfer_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let config = SourceConfig::default()
        .with_download(true)
        .with_sample(true);
    let (resolver, calls) = offline_resolver(config);

    let err = resolver.resolve(dir.path()).unwrap_err();
    assert!(matches!(err, TripcastError::TransferError { .. }), "got {:?}", err);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_transfer_failure_with_fallback_synthesizes() {
    let dir = tempfile::tempdir().unwrap();
    let config = SourceConfig::default()
        .with_download(true)
        .with_sample(true)
        .with_synthetic_fallback(true);
    let (resolver, _) = offline_resolver(config);

    let dataset = resolver.resolve(dir.path()).unwrap();
    assert_eq!(dataset.provenance(), Provenance::Synthetic);
}

#[test]
fn test_existing_csv_is_used_as_is() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trips.csv");
    std::fs::write(
        &path,
        "tpep_pickup_datetime,tpep_dropoff_datetime,trip_distance\n\
         2024-01-01 08:00:00,2024-01-01 08:10:00,2.5\n",
    )
    .unwrap();
    let (resolver, _) = offline_resolver(SourceConfig::default().with_download(true));

    let dataset = resolver.resolve(dir.path()).unwrap();
    assert_eq!(dataset.provenance(), Provenance::Cached);
    assert_eq!(dataset.files(), &[path]);
}
