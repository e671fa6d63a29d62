//! Cascade prediction value objects and training fit reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One variable exceeding its configured bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintViolation {
    /// Id of the variable that violated its bounds.
    pub variable_id: String,
    /// The predicted value that fell outside the bounds.
    pub predicted_value: f64,
    /// The (min, max) bound pair that was violated.
    pub bound: (f64, f64),
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} = {:.3} outside [{:.3}, {:.3}]",
            self.variable_id, self.predicted_value, self.bound.0, self.bound.1
        )
    }
}

/// Result of one end-to-end cascade evaluation. Created fresh per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadePrediction {
    /// Predicted value for each CV, keyed by variable id.
    pub predicted_cvs: BTreeMap<String, f64>,
    /// Predicted target value. When the CV stage is hard-infeasible this is
    /// the configured sentinel penalty, not a quality-model output.
    pub predicted_target: f64,
    /// One-sigma uncertainty on the target, when the quality regressor
    /// supports it.
    pub target_std: Option<f64>,
    /// Whether every predicted CV satisfied its constraints.
    pub is_feasible: bool,
    /// Violations recorded by the constraint evaluator.
    pub violations: Vec<ConstraintViolation>,
    /// Continuous constraint penalty (zero when fully inside bounds).
    pub constraint_penalty: f64,
}

/// Fit-quality metrics for one trained sub-model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    /// Coefficient of determination on the held-out tail.
    pub r_squared: f64,
    /// Root-mean-square error on the held-out tail.
    pub rmse: f64,
    /// Rows used for fitting.
    pub n_train: usize,
    /// Rows held out for evaluation.
    pub n_test: usize,
    /// Normalized absolute coefficient per input, keyed by variable id.
    pub feature_importance: BTreeMap<String, f64>,
}

/// Summary of a full training pass (all process models plus the quality model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    /// Per-CV fit metrics.
    pub process_reports: BTreeMap<String, FitReport>,
    /// Quality-model fit metrics.
    pub quality_report: FitReport,
    /// Bundle version published by this training pass.
    pub bundle_version: u64,
    /// Wall-clock training timestamp (UTC).
    pub trained_at: chrono::DateTime<chrono::Utc>,
}
