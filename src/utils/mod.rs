//! Utility functions and types

pub mod columns;
pub mod data_loader;

pub use columns::{columns_to_array2, f64_values, has_column, target_to_array1};
pub use data_loader::{infer_format, list_data_files, DataFormat, DataLoader, DataSaver};
