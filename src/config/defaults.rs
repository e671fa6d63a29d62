//! Built-in default values for every configurable engine constant.
//!
//! These match the behavior of the original operating-point tooling; the TOML
//! config exists so that none of them has to be inherited silently.

// === Training ===

/// Minimum rows required after cleaning before a model will be fit.
pub const MIN_TRAINING_ROWS: usize = 100;

/// Default held-out fraction for fit evaluation (time-ordered tail).
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Ridge regularization strength.
pub const RIDGE_LAMBDA: f64 = 1.0;

/// Bootstrap members in an uncertainty-capable ensemble.
pub const ENSEMBLE_SIZE: usize = 10;

// === Constraints ===

/// Penalty factor applied to squared bound excursions.
pub const PENALTY_FACTOR: f64 = 1000.0;

/// Soft-mode tolerance band as a fraction of the bound width.
pub const SOFT_TOLERANCE_FRACTION: f64 = 0.05;

/// Soft-mode feasibility threshold: penalty below this counts as feasible.
pub const SOFT_FEASIBILITY_THRESHOLD: f64 = 1.0;

// === Optimization ===

/// Random trials before the surrogate sampler activates.
pub const N_STARTUP_TRIALS: usize = 10;

/// Quantile split between "good" and "bad" trials in the surrogate.
pub const SAMPLER_GAMMA: f64 = 0.25;

/// Candidates drawn per proposal; the best density ratio wins.
pub const SAMPLER_CANDIDATES: usize = 24;

/// Target value assigned to hard-infeasible predictions instead of running
/// the quality model outside its training envelope.
pub const INFEASIBLE_SENTINEL: f64 = 999.0;

/// Weight on the mean target across scenarios in robust mode.
pub const ROBUST_MEAN_WEIGHT: f64 = 0.7;

/// Weight on the worst-case target across scenarios in robust mode.
pub const ROBUST_WORST_WEIGHT: f64 = 0.3;

/// Default minimum fraction of feasible scenarios in robust mode.
pub const ROBUST_FEASIBILITY_THRESHOLD: f64 = 0.8;

/// Fraction of best trials used when target-seeking finds zero strict
/// successes. The result is flagged relaxed whenever this fires.
pub const FALLBACK_FRACTION: f64 = 0.10;

/// Default confidence band percentiles for parameter distributions.
pub const CONFIDENCE_BAND: (u8, u8) = (5, 95);

/// Monte-Carlo samples for uncertainty when the regressor lacks the
/// `predict_with_uncertainty` capability.
pub const MC_PERTURBATION_SAMPLES: usize = 32;

/// Relative input perturbation sigma for the Monte-Carlo fallback.
pub const MC_PERTURBATION_SIGMA: f64 = 0.01;
