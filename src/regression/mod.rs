//! Regressor capability behind the cascade models.
//!
//! The engine treats regression training as a pluggable capability: anything
//! implementing `Regressor` can sit inside a process or quality model. The
//! built-in trainer is closed-form ridge regression on standardized features,
//! with a bootstrap ensemble variant that supplies (mean, std) predictions
//! for uncertainty-aware callers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("Cannot fit on {0} rows with {1} features")]
    TooFewRows(usize, usize),

    #[error("Design matrix is singular even after ridge regularization")]
    Singular,

    #[error("Row width {0} does not match feature count {1}")]
    WidthMismatch(usize, usize),
}

/// Object-safe regressor capability.
///
/// `predict_with_uncertainty` is optional: point-estimate regressors return
/// `None` and callers fall back to Monte-Carlo input perturbation.
pub trait Regressor: Send + Sync + std::fmt::Debug {
    /// Point prediction for one (already scaled) input vector.
    fn predict(&self, x: &[f64]) -> f64;

    /// Per-feature weights, aligned with the model's `input_order`.
    fn feature_weights(&self) -> &[f64];

    /// (mean, one-sigma) prediction when the regressor supports it.
    fn predict_with_uncertainty(&self, _x: &[f64]) -> Option<(f64, f64)> {
        None
    }
}

/// Closed-form ridge regression: `w = (XᵀX + λI)⁻¹ Xᵀ(y - ȳ)` on
/// standardized inputs, intercept = ȳ.
#[derive(Debug, Clone)]
pub struct RidgeRegressor {
    weights: Vec<f64>,
    intercept: f64,
}

impl RidgeRegressor {
    /// Fit on a row-major scaled matrix against raw targets.
    pub fn fit(x: &[Vec<f64>], y: &[f64], lambda: f64) -> Result<Self, RegressionError> {
        let n = x.len();
        let p = x.first().map_or(0, Vec::len);
        if n < p + 2 || p == 0 {
            return Err(RegressionError::TooFewRows(n, p));
        }

        let y_mean = y.iter().sum::<f64>() / n as f64;

        // Normal equations: A = XᵀX + λI, b = Xᵀ(y - ȳ)
        let mut a = vec![vec![0.0; p]; p];
        let mut b = vec![0.0; p];
        for (row, &yi) in x.iter().zip(y.iter()) {
            let resid = yi - y_mean;
            for i in 0..p {
                b[i] += row[i] * resid;
                for j in i..p {
                    a[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 0..p {
            for j in 0..i {
                a[i][j] = a[j][i];
            }
            a[i][i] += lambda.max(1e-12);
        }

        let weights = solve_gaussian(&mut a, &mut b)?;
        Ok(Self {
            weights,
            intercept: y_mean,
        })
    }
}

impl Regressor for RidgeRegressor {
    fn predict(&self, x: &[f64]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(x.iter())
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }

    fn feature_weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Bootstrap bag of ridge fits. The spread of member predictions supplies
/// the uncertainty estimate.
#[derive(Debug)]
pub struct EnsembleRegressor {
    members: Vec<RidgeRegressor>,
    mean_weights: Vec<f64>,
}

impl EnsembleRegressor {
    /// Fit `size` members on bootstrap resamples of the training rows.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        lambda: f64,
        size: usize,
        seed: u64,
    ) -> Result<Self, RegressionError> {
        let n = x.len();
        let p = x.first().map_or(0, Vec::len);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut members = Vec::with_capacity(size.max(1));

        for _ in 0..size.max(1) {
            let mut bx = Vec::with_capacity(n);
            let mut by = Vec::with_capacity(n);
            for _ in 0..n {
                let i = rng.gen_range(0..n);
                bx.push(x[i].clone());
                by.push(y[i]);
            }
            // A degenerate resample can be singular; retry on the full data.
            match RidgeRegressor::fit(&bx, &by, lambda) {
                Ok(m) => members.push(m),
                Err(_) => members.push(RidgeRegressor::fit(x, y, lambda)?),
            }
        }

        let mut mean_weights = vec![0.0; p];
        for m in &members {
            for (acc, w) in mean_weights.iter_mut().zip(m.feature_weights()) {
                *acc += w;
            }
        }
        for w in &mut mean_weights {
            *w /= members.len() as f64;
        }

        Ok(Self {
            members,
            mean_weights,
        })
    }
}

impl Regressor for EnsembleRegressor {
    fn predict(&self, x: &[f64]) -> f64 {
        self.members.iter().map(|m| m.predict(x)).sum::<f64>() / self.members.len() as f64
    }

    fn feature_weights(&self) -> &[f64] {
        &self.mean_weights
    }

    fn predict_with_uncertainty(&self, x: &[f64]) -> Option<(f64, f64)> {
        let preds: Vec<f64> = self.members.iter().map(|m| m.predict(x)).collect();
        let n = preds.len() as f64;
        let mean = preds.iter().sum::<f64>() / n;
        let var = preds.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        Some((mean, var.sqrt()))
    }
}

/// Solve `A w = b` in place via Gaussian elimination with partial pivoting.
fn solve_gaussian(a: &mut [Vec<f64>], b: &mut [f64]) -> Result<Vec<f64>, RegressionError> {
    let p = b.len();
    for col in 0..p {
        // Partial pivot
        let mut pivot = col;
        for row in col + 1..p {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-12 {
            return Err(RegressionError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..p {
            let factor = a[row][col] / a[col][col];
            for k in col..p {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut w = vec![0.0; p];
    for col in (0..p).rev() {
        let mut sum = b[col];
        for k in col + 1..p {
            sum -= a[col][k] * w[k];
        }
        w[col] = sum / a[col][col];
    }
    Ok(w)
}

/// Held-out fit metrics: coefficient of determination and RMSE.
pub fn fit_metrics(regressor: &dyn Regressor, x_test: &[Vec<f64>], y_test: &[f64]) -> (f64, f64) {
    if x_test.is_empty() {
        return (0.0, 0.0);
    }
    let n = y_test.len() as f64;
    let y_mean = y_test.iter().sum::<f64>() / n;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (row, &yi) in x_test.iter().zip(y_test.iter()) {
        let pred = regressor.predict(row);
        ss_res += (yi - pred).powi(2);
        ss_tot += (yi - y_mean).powi(2);
    }
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };
    let rmse = (ss_res / n).sqrt();
    (r_squared, rmse)
}
