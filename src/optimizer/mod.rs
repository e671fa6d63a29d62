//! Constrained optimization over the cascade model.
//!
//! ## Run anatomy
//!
//! One run acquires a single bundle snapshot, builds a proposal sampler over
//! the MV bounds, and then loops: propose, score through the active
//! [`SearchMode`], record. A retrain during the run never changes what this
//! run is optimizing against. Trial-recoverable prediction failures are
//! logged and penalized; anything else aborts the run.

pub mod distribution;
pub mod modes;
pub mod planner;
pub mod sampler;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::cascade::{CascadeModelManager, PredictionError};
use crate::config;
use crate::config::defaults;
use crate::constraints::ConstraintMode;
use crate::types::{ObjectiveValue, OptimizationResult, Trial};

pub use modes::{Pareto, Robust, SearchMode, SingleObjective, TargetSeeking, TrialContext};
pub use planner::{create_implementation_plan, PlanError};
pub use sampler::TpeSampler;

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error("Optimization run produced no trials")]
    NoTrials,

    #[error("Every trial in the run failed to score")]
    AllTrialsFailed,
}

/// Knobs for one optimization run.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Trial budget.
    pub n_trials: usize,
    /// Optional wall-clock budget; the run stops early and flags `timed_out`.
    pub timeout: Option<Duration>,
    /// Sampler seed. `None` draws one from entropy.
    pub seed: Option<u64>,
    /// Constraint mode applied to every cascade evaluation in the run.
    pub constraint_mode: ConstraintMode,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            n_trials: 200,
            timeout: None,
            seed: None,
            constraint_mode: ConstraintMode::Hard,
        }
    }
}

fn cfg_sentinel() -> f64 {
    if config::is_initialized() {
        config::get().optimization.infeasible_sentinel
    } else {
        defaults::INFEASIBLE_SENTINEL
    }
}

/// Drives search modes against a trained cascade.
pub struct OptimizationEngine {
    manager: Arc<CascadeModelManager>,
}

impl OptimizationEngine {
    pub fn new(manager: Arc<CascadeModelManager>) -> Self {
        Self { manager }
    }

    /// Run one optimization with the given mode, DV context, and settings.
    pub fn optimize(
        &self,
        mode: &dyn SearchMode,
        dv_values: &BTreeMap<String, f64>,
        settings: &SearchSettings,
    ) -> Result<OptimizationResult, OptimizationError> {
        if settings.n_trials == 0 {
            return Err(OptimizationError::NoTrials);
        }

        // One snapshot for the whole run.
        let bundle = self.manager.bundle()?;
        let sentinel = cfg_sentinel();
        let ctx = TrialContext {
            manager: &self.manager,
            bundle: &bundle,
            dv_values,
            constraint_mode: settings.constraint_mode,
            sentinel,
        };

        let registry = self.manager.registry();
        let mv_ids = registry.mv_ids();
        let bounds: Vec<(f64, f64)> = mv_ids
            .iter()
            .filter_map(|id| registry.get(id))
            .map(|s| (s.lower_bound, s.upper_bound))
            .collect();
        let seed = settings.seed.unwrap_or_else(rand::random);
        let mut sampler = TpeSampler::new(bounds, seed);

        info!(
            mode = mode.name(),
            n_trials = settings.n_trials,
            bundle_version = bundle.version,
            seed,
            "Starting optimization run"
        );

        let start = Instant::now();
        let mut timed_out = false;
        let mut trials: Vec<Trial> = Vec::with_capacity(settings.n_trials);
        let mut history: Vec<(Vec<f64>, f64)> = Vec::with_capacity(settings.n_trials);

        for trial_idx in 0..settings.n_trials {
            if let Some(budget) = settings.timeout {
                if start.elapsed() >= budget {
                    timed_out = true;
                    warn!(
                        trial_idx,
                        elapsed_secs = start.elapsed().as_secs_f64(),
                        "Wall-clock budget exhausted, stopping run early"
                    );
                    break;
                }
            }

            let x = sampler.propose(&history);
            let mv_values: BTreeMap<String, f64> = mv_ids
                .iter()
                .cloned()
                .zip(x.iter().copied())
                .collect();

            let trial = match mode.score(&ctx, mv_values.clone()) {
                Ok(trial) => trial,
                Err(e) if e.is_trial_recoverable() => {
                    warn!(trial_idx, error = %e, "Trial failed, penalizing and continuing");
                    Trial {
                        mv_values,
                        objective: ObjectiveValue::Scalar(sentinel * 2.0),
                        feasible: false,
                        prediction: None,
                    }
                }
                Err(e) => return Err(e.into()),
            };

            history.push((x, trial.objective.scalar()));
            trials.push(trial);
        }

        if trials.is_empty() {
            return Err(OptimizationError::NoTrials);
        }

        // Feasibility first, then objective value. Recovered failures carry
        // no prediction and are never eligible as the best trial, no matter
        // how their penalty compares to scored-but-infeasible trials.
        let best = trials
            .iter()
            .filter(|t| t.prediction.is_some())
            .min_by(|a, b| {
                (!a.feasible, a.objective.scalar())
                    .partial_cmp(&(!b.feasible, b.objective.scalar()))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(OptimizationError::AllTrialsFailed)?
            .clone();
        let best_prediction = best
            .prediction
            .clone()
            .ok_or(OptimizationError::AllTrialsFailed)?;

        let feasible_trial_count = trials.iter().filter(|t| t.feasible).count();
        let detail = mode.detail(&ctx, &trials, &best)?;
        let elapsed_secs = start.elapsed().as_secs_f64();

        info!(
            mode = mode.name(),
            trials = trials.len(),
            feasible = feasible_trial_count,
            best_objective = best.objective.scalar(),
            elapsed_secs,
            timed_out,
            "Optimization run finished"
        );

        Ok(OptimizationResult {
            best_mv: best.mv_values,
            best_prediction,
            best_objective: best.objective.scalar(),
            feasible: best.feasible,
            trial_count: trials.len(),
            feasible_trial_count,
            elapsed_secs,
            timed_out,
            detail,
        })
    }
}
