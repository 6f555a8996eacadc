//! Dataset loading and feature/label separation

use crate::error::{AnomalyError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Ordered, named numeric feature columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }
}

/// Quick facts about a labeled dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub n_rows: usize,
    pub n_columns: usize,
    pub n_anomalies: usize,
    pub anomaly_ratio: f64,
}

/// Load a comma-delimited table with a header row
pub fn load(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AnomalyError::DatasetNotFound(path.display().to_string()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    info!(path = %path.display(), rows = df.height(), cols = df.width(), "Dataset loaded");
    Ok(df)
}

/// Separate the label column and drop auxiliary columns
///
/// Every remaining column becomes a feature and must hold numbers only.
pub fn split_features_labels(
    df: &DataFrame,
    label_column: &str,
    drop_columns: &[String],
) -> Result<(FeatureMatrix, Array1<u8>)> {
    let labels = extract_labels(df, label_column)?;

    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != label_column)
        .filter(|name| !drop_columns.iter().any(|d| d.as_str() == name.as_str()))
        .map(|name| name.to_string())
        .collect();

    if names.is_empty() {
        return Err(AnomalyError::DataError(
            "no feature columns left after removing label and auxiliary columns".to_string(),
        ));
    }

    let values = columns_to_array2(df, &names)?;
    Ok((FeatureMatrix { names, values }, labels))
}

/// Count rows and anomalies
pub fn summarize(df: &DataFrame, label_column: &str) -> Result<DatasetSummary> {
    let labels = extract_labels(df, label_column)?;
    let n_anomalies = labels.iter().filter(|&&l| l == 1).count();
    let n_rows = labels.len();

    Ok(DatasetSummary {
        n_rows,
        n_columns: df.width(),
        n_anomalies,
        anomaly_ratio: if n_rows > 0 { n_anomalies as f64 / n_rows as f64 } else { 0.0 },
    })
}

/// Extract named columns from a DataFrame into a row-major matrix
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| numeric_column(df, name))
        .collect::<Result<_>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((df.height(), col_names.len()), |(r, c)| col_refs[c][r]))
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| AnomalyError::FeatureNotFound(name.to_string()))?;

    // Non-numeric cells become null under the cast and are reported below
    let as_f64 = column.cast(&DataType::Float64)?;
    as_f64
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(AnomalyError::DataError(format!(
                "column '{}' row {}: missing or non-numeric value",
                name, row
            ))),
        })
        .collect()
}

/// Read a binary label column
pub fn extract_labels(df: &DataFrame, label_column: &str) -> Result<Array1<u8>> {
    if df.column(label_column).is_err() {
        return Err(AnomalyError::FeatureNotFound(label_column.to_string()));
    }

    numeric_column(df, label_column)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            if v == 0.0 {
                Ok(0u8)
            } else if v == 1.0 {
                Ok(1u8)
            } else {
                Err(AnomalyError::DataError(format!(
                    "label column '{}' row {}: expected 0 or 1, got {}",
                    label_column, row, v
                )))
            }
        })
        .collect()
}
