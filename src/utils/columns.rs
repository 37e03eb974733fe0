//! Column extraction helpers shared by the feature and training stages

use crate::error::{Result, TripcastError};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Values of `name` as `f64`, with nulls and NaN both reported as `None`.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| TripcastError::FeatureNotFound(name.to_string()))?;
    let as_f64 = column
        .cast(&DataType::Float64)
        .map_err(|e| TripcastError::DataError(format!("{}: {}", name, e)))?;
    let values = as_f64
        .f64()
        .map_err(|e| TripcastError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(values)
}

/// Whether `df` has a column called `name`
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

/// Fully populated target vector; any missing value is a data quality error.
pub fn target_to_array1(df: &DataFrame, target: &str) -> Result<Array1<f64>> {
    let values = f64_values(df, target)?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                TripcastError::DataQualityError(format!(
                    "Missing value in target '{}' at row {}",
                    target, row
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}

/// Extract named columns, in the given order, into a row-major `Array2<f64>`.
///
/// Lookups are by name so the column order of `df` never matters.
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            f64_values(df, col_name)?
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.ok_or_else(|| {
                        TripcastError::DataQualityError(format!(
                            "Missing value in feature '{}' at row {}",
                            col_name, row
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}
