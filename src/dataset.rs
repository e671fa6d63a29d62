//! Training-table boundary with the data-acquisition collaborator.
//!
//! The engine consumes an already-cleaned tabular dataset: one row per
//! observation, time-ordered, columns named exactly as the variable ids in
//! the registry. Resampling, interpolation, and join-on-timestamp logic all
//! live upstream.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("Column missing from training table: {0}")]
    MissingColumn(String),

    #[error("Ragged training table: column {0} has {1} rows, expected {2}")]
    RaggedColumn(String, usize, usize),

    #[error("Insufficient training data: have {0} rows, need {1}")]
    InsufficientRows(usize, usize),

    #[error("Training table has no columns")]
    Empty,

    #[error("Column {0} contains a non-finite value at row {1}")]
    NonFiniteValue(String, usize),
}

/// Column-keyed, time-ordered table of `f64` observations.
#[derive(Debug, Clone)]
pub struct TrainingTable {
    columns: BTreeMap<String, Vec<f64>>,
    n_rows: usize,
}

impl TrainingTable {
    /// Build a table, verifying rectangular shape and finite values.
    pub fn new(columns: BTreeMap<String, Vec<f64>>) -> Result<Self, DataError> {
        let n_rows = columns
            .values()
            .next()
            .map(Vec::len)
            .ok_or(DataError::Empty)?;

        for (id, col) in &columns {
            if col.len() != n_rows {
                return Err(DataError::RaggedColumn(id.clone(), col.len(), n_rows));
            }
            if let Some(row) = col.iter().position(|v| !v.is_finite()) {
                return Err(DataError::NonFiniteValue(id.clone(), row));
            }
        }

        Ok(Self { columns, n_rows })
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.n_rows
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Whether a column exists.
    pub fn has_column(&self, id: &str) -> bool {
        self.columns.contains_key(id)
    }

    /// Full column by id.
    pub fn column(&self, id: &str) -> Result<&[f64], DataError> {
        self.columns
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::MissingColumn(id.to_string()))
    }

    /// Time-ordered holdout boundary: rows `[0, boundary)` train, rows
    /// `[boundary, len)` evaluate. Never shuffled — shuffling would leak
    /// future observations into the fit.
    pub fn split_boundary(&self, test_fraction: f64) -> usize {
        let f = test_fraction.clamp(0.0, 0.9);
        let n_test = (self.n_rows as f64 * f).round() as usize;
        self.n_rows - n_test.min(self.n_rows)
    }

    /// Extract a row-major matrix for the given columns over a row range.
    pub fn matrix(
        &self,
        ids: &[String],
        range: std::ops::Range<usize>,
    ) -> Result<Vec<Vec<f64>>, DataError> {
        let mut cols = Vec::with_capacity(ids.len());
        for id in ids {
            cols.push(self.column(id)?);
        }
        Ok(range
            .map(|r| cols.iter().map(|c| c[r]).collect())
            .collect())
    }

    /// Extract one column over a row range.
    pub fn vector(
        &self,
        id: &str,
        range: std::ops::Range<usize>,
    ) -> Result<Vec<f64>, DataError> {
        Ok(self.column(id)?[range].to_vec())
    }
}
