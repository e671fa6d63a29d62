//! Optimization engine types: trials, search results, distributions, rollout plans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::CascadePrediction;

/// Whether the target is being pushed down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    /// Sign-adjust a raw target value so that lower is always better.
    pub fn signed(self, value: f64) -> f64 {
        match self {
            Self::Minimize => value,
            Self::Maximize => -value,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimize => write!(f, "minimize"),
            Self::Maximize => write!(f, "maximize"),
        }
    }
}

/// Objective value of one trial: scalar for most modes, a pair for Pareto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObjectiveValue {
    Scalar(f64),
    /// (target component, operational cost component)
    Pair(f64, f64),
}

impl ObjectiveValue {
    /// Scalar view used for ranking and for the proposal surrogate.
    pub fn scalar(&self) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::Pair(a, b) => a + b,
        }
    }
}

/// One candidate MV vector evaluated during a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    /// The proposed MV setting.
    pub mv_values: BTreeMap<String, f64>,
    /// Mode-specific objective value (always lower-is-better internally).
    pub objective: ObjectiveValue,
    /// Whether the trial's cascade prediction was feasible.
    pub feasible: bool,
    /// Full cascade prediction for this trial, if scoring succeeded.
    pub prediction: Option<CascadePrediction>,
}

/// A point on the Pareto front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoPoint {
    pub mv_values: BTreeMap<String, f64>,
    pub predicted_target: f64,
    pub operational_cost: f64,
    pub feasible: bool,
}

impl ParetoPoint {
    /// Pareto dominance: no worse on both objectives, strictly better on one.
    pub fn dominates(&self, other: &Self) -> bool {
        let no_worse = self.predicted_target <= other.predicted_target
            && self.operational_cost <= other.operational_cost;
        let strictly_better = self.predicted_target < other.predicted_target
            || self.operational_cost < other.operational_cost;
        no_worse && strictly_better
    }
}

/// Statistical summary of one variable across a filtered trial population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDistribution {
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    /// Requested percentiles, keyed by percentile rank (e.g. 5, 95).
    pub percentiles: BTreeMap<u8, f64>,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
}

/// Robust-mode summary of the best trial across the scenario envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustSummary {
    /// Number of DV scenarios evaluated per trial.
    pub scenario_count: usize,
    /// Mean predicted target of the best trial across scenarios.
    pub mean_target: f64,
    /// Worst-case predicted target of the best trial across scenarios.
    pub worst_target: f64,
    /// Fraction of scenarios feasible for the best trial.
    pub feasible_fraction: f64,
    /// Feasibility gate the run enforced.
    pub feasibility_threshold: f64,
}

/// Target-seeking mode output: which trials hit the band, and how the
/// successful settings are distributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSeekingAnalysis {
    pub desired_target: f64,
    pub tolerance_fraction: f64,
    /// Trials whose objective fell within the tolerance band.
    pub successful_trial_count: usize,
    /// True when zero trials met strict tolerance and the analysis fell back
    /// to the best-scoring fraction of all trials. Never presented as
    /// "achieved".
    pub relaxed: bool,
    /// Per-MV distribution over the successful trials.
    pub mv_distributions: BTreeMap<String, ParameterDistribution>,
    /// Per-CV distribution, obtained by re-running the cascade on the
    /// successful MV settings.
    pub cv_distributions: BTreeMap<String, ParameterDistribution>,
}

/// Mode-specific section of an optimization result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModeDetail {
    SingleObjective {
        direction: Direction,
    },
    Pareto {
        front: Vec<ParetoPoint>,
    },
    Robust {
        summary: RobustSummary,
    },
    TargetSeeking {
        analysis: TargetSeekingAnalysis,
    },
}

/// Outcome of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Best MV setting found (feasibility-first, then objective value).
    pub best_mv: BTreeMap<String, f64>,
    /// Cascade prediction at the best setting.
    pub best_prediction: CascadePrediction,
    /// Scored objective of the best trial.
    pub best_objective: f64,
    /// Whether the best trial was feasible.
    pub feasible: bool,
    /// Total trials evaluated.
    pub trial_count: usize,
    /// How many trials were feasible. Zero is reported explicitly, never
    /// masked behind a feasible-looking best guess.
    pub feasible_trial_count: usize,
    /// Wall-clock seconds spent in the run.
    pub elapsed_secs: f64,
    /// True when the wall-clock budget stopped the run before `n_trials`.
    pub timed_out: bool,
    /// Mode-specific payload.
    pub detail: ModeDetail,
}

/// One stage of a staged rollout from a current to a target MV setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationStage {
    /// Stage index: 0 = current setting, N = target setting.
    pub step: usize,
    /// Percent progress along the rollout (0–100).
    pub percent: f64,
    /// MV values at this stage.
    pub mv_values: BTreeMap<String, f64>,
}
