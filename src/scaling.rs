//! Per-model feature standardization.
//!
//! Each trained sub-model owns exactly one scaler, fit on its own training
//! matrix. Scalers are never shared across models: the mean/scale pair is
//! part of the model's identity, the same way its `input_order` is.

use serde::{Deserialize, Serialize};

/// Minimum standard deviation to avoid divide-by-zero on constant columns.
const MIN_SCALE: f64 = 1e-8;

/// Reversible zero-mean unit-variance transform, fit column-wise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl FeatureScaler {
    /// Fit from a row-major training matrix. Every row must have the same
    /// width; the caller (the dataset layer) guarantees this.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_cols = rows.first().map_or(0, Vec::len);
        let n = rows.len() as f64;
        let mut mean = vec![0.0; n_cols];
        let mut scale = vec![1.0; n_cols];
        if rows.is_empty() {
            return Self { mean, scale };
        }

        for row in rows {
            for (m, &x) in mean.iter_mut().zip(row.iter()) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        for (c, s) in scale.iter_mut().enumerate() {
            let var = rows.iter().map(|r| (r[c] - mean[c]).powi(2)).sum::<f64>() / n;
            *s = var.sqrt().max(MIN_SCALE);
        }

        Self { mean, scale }
    }

    /// Forward transform: `(x - mean) / scale`.
    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect()
    }

    /// Inverse transform: `x * scale + mean`.
    pub fn inverse(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(&v, (&m, &s))| v * s + m)
            .collect()
    }

    /// Transform every row of a matrix.
    pub fn transform_matrix(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Number of columns this scaler was fit on.
    pub fn width(&self) -> usize {
        self.mean.len()
    }
}
