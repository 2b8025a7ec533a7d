//! # Record Loading and Validation
//!
//! Reads a tab-separated record file into the arrays the scan driver needs.
//!
//! - Required columns: `outcome` (0 or 1), `probability` (in `[0, 1]`) and
//!   `cluster` (integer label; `-1` marks outliers).
//! - Optional column: `error` (0 or 1; when absent it is derived from the
//!   classification threshold as `(probability >= threshold) != outcome`).
//! - Nulls, non-numeric data, non-finite values, and values outside their
//!   domain are rejected with a `DataError` naming the column.

use ndarray::Array1;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Validated per-record arrays, all of the same length.
#[derive(Debug, Clone)]
pub struct ScanRecords {
    pub outcomes: Array1<f64>,
    pub probabilities: Array1<f64>,
    pub clusters: Array1<i64>,
    pub errors: Array1<f64>,
}

impl ScanRecords {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Builds records from in-memory arrays, deriving `errors` from `threshold`.
    pub fn from_predictions(
        outcomes: Array1<f64>,
        probabilities: Array1<f64>,
        clusters: Array1<i64>,
        threshold: f64,
    ) -> Self {
        let errors = derive_errors(&outcomes, &probabilities, threshold);
        Self {
            outcomes,
            probabilities,
            clusters,
            errors,
        }
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in the column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("Value {value} at row {row} of column '{column_name}' is outside {domain}.")]
    ValueOutOfRange {
        column_name: String,
        row: usize,
        value: f64,
        domain: &'static str,
    },
    #[error("The input file contains no data rows.")]
    NoRows,
}

/// Loads and validates a record file.
pub fn load_records(path: &str, threshold: f64) -> Result<ScanRecords, DataError> {
    log::info!("Loading records from '{path}'");

    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::NoRows);
    }

    let columns: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for required in ["outcome", "probability", "cluster"] {
        if !columns.contains(required) {
            return Err(DataError::ColumnNotFound(required.to_string()));
        }
    }

    let outcomes = extract_numeric_column(&df, "outcome")?;
    check_binary(&outcomes, "outcome")?;

    let probabilities = extract_numeric_column(&df, "probability")?;
    for (row, &p) in probabilities.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(DataError::ValueOutOfRange {
                column_name: "probability".to_string(),
                row: row + 1,
                value: p,
                domain: "[0, 1]",
            });
        }
    }

    let clusters = extract_label_column(&df, "cluster")?;

    let outcomes = Array1::from_vec(outcomes);
    let probabilities = Array1::from_vec(probabilities);

    let errors = if columns.contains("error") {
        let errors = extract_numeric_column(&df, "error")?;
        check_binary(&errors, "error")?;
        Array1::from_vec(errors)
    } else {
        derive_errors(&outcomes, &probabilities, threshold)
    };

    log::info!(
        "Loaded {} records across {} distinct cluster labels.",
        outcomes.len(),
        clusters.iter().collect::<HashSet<_>>().len()
    );

    Ok(ScanRecords {
        outcomes,
        probabilities,
        clusters: Array1::from_vec(clusters),
        errors,
    })
}

fn derive_errors(
    outcomes: &Array1<f64>,
    probabilities: &Array1<f64>,
    threshold: f64,
) -> Array1<f64> {
    ndarray::Zip::from(outcomes)
        .and(probabilities)
        .map_collect(|&y, &p| {
            let predicted = if p >= threshold { 1.0 } else { 0.0 };
            if predicted == y { 0.0 } else { 1.0 }
        })
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let casted = match series.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }
    };
    if casted.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

fn extract_label_column(df: &DataFrame, column_name: &str) -> Result<Vec<i64>, DataError> {
    let values = extract_numeric_column(df, column_name)?;
    values
        .iter()
        .enumerate()
        .map(|(row, &v)| {
            if v.fract() == 0.0 && v.abs() <= i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(DataError::ColumnWrongType {
                    column_name: column_name.to_string(),
                    expected_type: "integer cluster label",
                    found_type: format!("{v} at row {}", row + 1),
                })
            }
        })
        .collect()
}

fn check_binary(values: &[f64], column_name: &str) -> Result<(), DataError> {
    match values.iter().position(|&v| v != 0.0 && v != 1.0) {
        Some(row) => Err(DataError::ValueOutOfRange {
            column_name: column_name.to_string(),
            row: row + 1,
            value: values[row],
            domain: "{0, 1}",
        }),
        None => Ok(()),
    }
}
