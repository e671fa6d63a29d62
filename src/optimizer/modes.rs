//! Search modes: how one proposed MV setting is scored, and how a finished
//! trial population is turned into a mode-specific result payload.
//!
//! Every mode scores lower-is-better internally. Maximize directions are
//! sign-flipped at scoring time, so the driver and the proposal surrogate
//! never branch on direction. Infeasible trials always score worse than any
//! feasible trial via the sentinel, regardless of direction.

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

use crate::cascade::{CascadeBundle, CascadeModelManager, PredictionError};
use crate::config;
use crate::config::defaults;
use crate::constraints::ConstraintMode;
use crate::optimizer::distribution::DistributionAnalyzer;
use crate::types::{
    Direction, ModeDetail, ObjectiveValue, ParetoPoint, RobustSummary, TargetSeekingAnalysis,
    Trial,
};

fn cfg_robust_weights() -> (f64, f64) {
    if config::is_initialized() {
        let opt = &config::get().optimization;
        (opt.robust_mean_weight, opt.robust_worst_weight)
    } else {
        (defaults::ROBUST_MEAN_WEIGHT, defaults::ROBUST_WORST_WEIGHT)
    }
}

fn cfg_fallback_fraction() -> f64 {
    if config::is_initialized() {
        config::get().optimization.fallback_fraction
    } else {
        defaults::FALLBACK_FRACTION
    }
}

fn cfg_confidence_band() -> (u8, u8) {
    if config::is_initialized() {
        config::get().optimization.confidence_band
    } else {
        defaults::CONFIDENCE_BAND
    }
}

/// Everything a mode needs to score one MV proposal against a fixed bundle
/// snapshot.
pub struct TrialContext<'a> {
    pub manager: &'a CascadeModelManager,
    pub bundle: &'a CascadeBundle,
    pub dv_values: &'a BTreeMap<String, f64>,
    pub constraint_mode: ConstraintMode,
    pub sentinel: f64,
}

/// One optimization mode: scoring plus result assembly.
pub trait SearchMode: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score one proposed MV setting. Errors bubble up; the driver decides
    /// whether they are trial-recoverable.
    fn score(
        &self,
        ctx: &TrialContext<'_>,
        mv_values: BTreeMap<String, f64>,
    ) -> Result<Trial, PredictionError>;

    /// Assemble the mode-specific payload from the finished population.
    fn detail(
        &self,
        ctx: &TrialContext<'_>,
        trials: &[Trial],
        best: &Trial,
    ) -> Result<ModeDetail, PredictionError>;
}

// === Single objective ===

/// Push the target down (or up) subject to constraints.
pub struct SingleObjective {
    pub direction: Direction,
}

impl SearchMode for SingleObjective {
    fn name(&self) -> &'static str {
        "single_objective"
    }

    fn score(
        &self,
        ctx: &TrialContext<'_>,
        mv_values: BTreeMap<String, f64>,
    ) -> Result<Trial, PredictionError> {
        let pred = ctx.manager.predict_cascade_with(
            ctx.bundle,
            &mv_values,
            ctx.dv_values,
            ctx.constraint_mode,
        )?;
        // An infeasible trial must never outrank a feasible one, even when
        // maximizing: it scores from the sentinel, not from the target.
        let scalar = if pred.is_feasible {
            self.direction.signed(pred.predicted_target) + pred.constraint_penalty
        } else {
            ctx.sentinel + pred.constraint_penalty
        };
        Ok(Trial {
            mv_values,
            objective: ObjectiveValue::Scalar(scalar),
            feasible: pred.is_feasible,
            prediction: Some(pred),
        })
    }

    fn detail(
        &self,
        _ctx: &TrialContext<'_>,
        _trials: &[Trial],
        _best: &Trial,
    ) -> Result<ModeDetail, PredictionError> {
        Ok(ModeDetail::SingleObjective {
            direction: self.direction,
        })
    }
}

// === Pareto ===

/// Trade the target off against a weighted operational cost of the MV
/// setting itself (energy, reagents, wear).
pub struct Pareto {
    pub direction: Direction,
    /// Per-MV cost weights; unlisted MVs cost nothing.
    pub cost_weights: BTreeMap<String, f64>,
}

impl Pareto {
    fn operational_cost(&self, mv_values: &BTreeMap<String, f64>) -> f64 {
        mv_values
            .iter()
            .map(|(id, v)| self.cost_weights.get(id).copied().unwrap_or(0.0) * v)
            .sum()
    }
}

impl SearchMode for Pareto {
    fn name(&self) -> &'static str {
        "pareto"
    }

    fn score(
        &self,
        ctx: &TrialContext<'_>,
        mv_values: BTreeMap<String, f64>,
    ) -> Result<Trial, PredictionError> {
        let pred = ctx.manager.predict_cascade_with(
            ctx.bundle,
            &mv_values,
            ctx.dv_values,
            ctx.constraint_mode,
        )?;
        let objective = if pred.is_feasible {
            ObjectiveValue::Pair(
                self.direction.signed(pred.predicted_target),
                self.operational_cost(&mv_values),
            )
        } else {
            // Both axes take the sentinel so an infeasible point can never
            // sit on the front.
            let bad = ctx.sentinel + pred.constraint_penalty;
            ObjectiveValue::Pair(bad, bad)
        };
        Ok(Trial {
            mv_values,
            objective,
            feasible: pred.is_feasible,
            prediction: Some(pred),
        })
    }

    fn detail(
        &self,
        _ctx: &TrialContext<'_>,
        trials: &[Trial],
        _best: &Trial,
    ) -> Result<ModeDetail, PredictionError> {
        // Dominance is computed on the signed target so the front is correct
        // for either direction; the reported point carries the raw target.
        let candidates: Vec<(&Trial, f64, f64)> = trials
            .iter()
            .filter(|t| t.feasible)
            .filter_map(|t| {
                t.prediction.as_ref().map(|p| {
                    (
                        t,
                        self.direction.signed(p.predicted_target),
                        self.operational_cost(&t.mv_values),
                    )
                })
            })
            .collect();

        let mut front = Vec::new();
        for (i, &(trial, target_i, cost_i)) in candidates.iter().enumerate() {
            let dominated = candidates.iter().enumerate().any(|(j, &(_, tj, cj))| {
                i != j
                    && tj <= target_i
                    && cj <= cost_i
                    && (tj < target_i || cj < cost_i)
            });
            if !dominated {
                front.push(ParetoPoint {
                    mv_values: trial.mv_values.clone(),
                    predicted_target: trial
                        .prediction
                        .as_ref()
                        .map_or(0.0, |p| p.predicted_target),
                    operational_cost: cost_i,
                    feasible: true,
                });
            }
        }
        front.sort_by(|a, b| {
            a.operational_cost
                .partial_cmp(&b.operational_cost)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!(front_size = front.len(), "Assembled Pareto front");
        Ok(ModeDetail::Pareto { front })
    }
}

// === Robust ===

/// Optimize a composite of mean and worst-case target across a set of DV
/// scenarios, gated on a minimum feasible-scenario fraction.
pub struct Robust {
    pub direction: Direction,
    /// DV scenarios; each replaces the context DV values entirely.
    pub scenarios: Vec<BTreeMap<String, f64>>,
    /// Minimum feasible-scenario fraction; `None` uses the configured gate.
    pub feasibility_threshold: Option<f64>,
}

impl Robust {
    fn threshold(&self) -> f64 {
        self.feasibility_threshold.unwrap_or_else(|| {
            if config::is_initialized() {
                config::get().optimization.robust_feasibility_threshold
            } else {
                defaults::ROBUST_FEASIBILITY_THRESHOLD
            }
        })
    }

    /// Evaluate every scenario for one MV setting. Scenario evaluations are
    /// independent, so they run in parallel.
    fn evaluate_scenarios(
        &self,
        ctx: &TrialContext<'_>,
        mv_values: &BTreeMap<String, f64>,
    ) -> Result<Vec<crate::types::CascadePrediction>, PredictionError> {
        self.scenarios
            .par_iter()
            .map(|dvs| {
                ctx.manager
                    .predict_cascade_with(ctx.bundle, mv_values, dvs, ctx.constraint_mode)
            })
            .collect()
    }
}

impl SearchMode for Robust {
    fn name(&self) -> &'static str {
        "robust"
    }

    fn score(
        &self,
        ctx: &TrialContext<'_>,
        mv_values: BTreeMap<String, f64>,
    ) -> Result<Trial, PredictionError> {
        let preds = self.evaluate_scenarios(ctx, &mv_values)?;
        let feasible_count = preds.iter().filter(|p| p.is_feasible).count();
        let feasible_fraction = if preds.is_empty() {
            0.0
        } else {
            feasible_count as f64 / preds.len() as f64
        };

        if feasible_count == 0 || feasible_fraction < self.threshold() {
            // Gate failed: score worse than any gated-in trial, graded by
            // how badly the gate failed so the surrogate still has signal.
            let scalar = ctx.sentinel * (2.0 - feasible_fraction);
            let worst = preds
                .into_iter()
                .max_by(|a, b| {
                    a.constraint_penalty
                        .partial_cmp(&b.constraint_penalty)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            return Ok(Trial {
                mv_values,
                objective: ObjectiveValue::Scalar(scalar),
                feasible: false,
                prediction: worst,
            });
        }

        // The composite runs over feasible scenarios only: hard-infeasible
        // scenarios carry the sentinel target, not a model output, and would
        // swamp both the mean and the worst case. The gate above bounds how
        // many scenarios may be excluded this way.
        let signed: Vec<f64> = preds
            .iter()
            .filter(|p| p.is_feasible)
            .map(|p| self.direction.signed(p.predicted_target))
            .collect();
        let mean = signed.iter().sum::<f64>() / signed.len() as f64;
        let worst = signed.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let (mw, ww) = cfg_robust_weights();

        // Carry the worst-case scenario's prediction: the conservative view
        // is what an operator acts on.
        let worst_pred = preds
            .into_iter()
            .filter(|p| p.is_feasible)
            .max_by(|a, b| {
                self.direction
                    .signed(a.predicted_target)
                    .partial_cmp(&self.direction.signed(b.predicted_target))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        Ok(Trial {
            mv_values,
            objective: ObjectiveValue::Scalar(mw * mean + ww * worst),
            feasible: true,
            prediction: worst_pred,
        })
    }

    fn detail(
        &self,
        ctx: &TrialContext<'_>,
        _trials: &[Trial],
        best: &Trial,
    ) -> Result<ModeDetail, PredictionError> {
        let preds = self.evaluate_scenarios(ctx, &best.mv_values)?;
        let n = preds.len() as f64;
        let feasible_fraction = preds.iter().filter(|p| p.is_feasible).count() as f64 / n;
        let mean_target = preds.iter().map(|p| p.predicted_target).sum::<f64>() / n;
        let worst_target = preds
            .iter()
            .map(|p| p.predicted_target)
            .max_by(|a, b| {
                self.direction
                    .signed(*a)
                    .partial_cmp(&self.direction.signed(*b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(f64::NAN);

        Ok(ModeDetail::Robust {
            summary: RobustSummary {
                scenario_count: self.scenarios.len(),
                mean_target,
                worst_target,
                feasible_fraction,
                feasibility_threshold: self.threshold(),
            },
        })
    }
}

// === Target seeking ===

/// Find settings that land the target near a desired value, then describe
/// how the successful settings are distributed.
pub struct TargetSeeking {
    pub desired_target: f64,
    /// Success band as a fraction of |desired|.
    pub tolerance_fraction: f64,
}

impl TargetSeeking {
    fn tolerance(&self) -> f64 {
        self.tolerance_fraction * self.desired_target.abs()
    }
}

impl SearchMode for TargetSeeking {
    fn name(&self) -> &'static str {
        "target_seeking"
    }

    fn score(
        &self,
        ctx: &TrialContext<'_>,
        mv_values: BTreeMap<String, f64>,
    ) -> Result<Trial, PredictionError> {
        let pred = ctx.manager.predict_cascade_with(
            ctx.bundle,
            &mv_values,
            ctx.dv_values,
            ctx.constraint_mode,
        )?;
        let scalar = if pred.is_feasible {
            (pred.predicted_target - self.desired_target).abs() + pred.constraint_penalty
        } else {
            ctx.sentinel + pred.constraint_penalty
        };
        Ok(Trial {
            mv_values,
            objective: ObjectiveValue::Scalar(scalar),
            feasible: pred.is_feasible,
            prediction: Some(pred),
        })
    }

    fn detail(
        &self,
        _ctx: &TrialContext<'_>,
        trials: &[Trial],
        _best: &Trial,
    ) -> Result<ModeDetail, PredictionError> {
        let tolerance = self.tolerance();
        let mut successes: Vec<&Trial> = trials
            .iter()
            .filter(|t| t.feasible)
            .filter(|t| {
                t.prediction
                    .as_ref()
                    .is_some_and(|p| (p.predicted_target - self.desired_target).abs() <= tolerance)
            })
            .collect();

        let relaxed = successes.is_empty();
        if relaxed {
            // Nothing hit the band: describe the best-scoring fraction
            // instead, and say so. Never presented as "achieved".
            let keep = ((trials.len() as f64 * cfg_fallback_fraction()).ceil() as usize).max(1);
            let mut ranked: Vec<&Trial> = trials.iter().collect();
            ranked.sort_by(|a, b| {
                a.objective
                    .scalar()
                    .partial_cmp(&b.objective.scalar())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            successes = ranked.into_iter().take(keep).collect();
            debug!(
                kept = successes.len(),
                "No trials within tolerance band, relaxing to best fraction"
            );
        }

        let (lo, hi) = cfg_confidence_band();
        let ranks = [lo, 50, hi];

        let mut mv_series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut cv_series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for trial in &successes {
            for (id, &v) in &trial.mv_values {
                mv_series.entry(id.clone()).or_default().push(v);
            }
            if let Some(pred) = &trial.prediction {
                for (id, &v) in &pred.predicted_cvs {
                    cv_series.entry(id.clone()).or_default().push(v);
                }
            }
        }

        Ok(ModeDetail::TargetSeeking {
            analysis: TargetSeekingAnalysis {
                desired_target: self.desired_target,
                tolerance_fraction: self.tolerance_fraction,
                successful_trial_count: if relaxed { 0 } else { successes.len() },
                relaxed,
                mv_distributions: DistributionAnalyzer::analyze_all(&mv_series, &ranks),
                cv_distributions: DistributionAnalyzer::analyze_all(&cv_series, &ranks),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TrainingTable;
    use crate::types::{VariableRegistry, VariableRole, VariableSpec};
    use std::sync::Arc;

    fn spec(id: &str, role: VariableRole, lo: f64, hi: f64) -> VariableSpec {
        VariableSpec {
            id: id.to_string(),
            role,
            lower_bound: lo,
            upper_bound: hi,
            unit: String::new(),
        }
    }

    fn make_manager(cv_hi: f64) -> CascadeModelManager {
        let registry = Arc::new(
            VariableRegistry::new(vec![
                spec("feed_rate", VariableRole::Mv, 0.0, 10.0),
                spec("mill_power", VariableRole::Cv, 0.0, cv_hi),
                spec("ore_hardness", VariableRole::Dv, 0.0, 10.0),
                spec("product_size", VariableRole::Target, -1e6, 1e6),
            ])
            .unwrap(),
        );
        let mgr = CascadeModelManager::new(registry);

        // mill_power = 2*feed, product_size = power + hardness + 1
        let feed: Vec<f64> = (0..500).map(|i| (i % 100) as f64 / 10.0).collect();
        let power: Vec<f64> = feed.iter().map(|f| 2.0 * f).collect();
        let hardness: Vec<f64> = (0..500).map(|i| (i % 7) as f64).collect();
        let size: Vec<f64> = power
            .iter()
            .zip(hardness.iter())
            .map(|(p, h)| p + h + 1.0)
            .collect();
        let mut cols = BTreeMap::new();
        cols.insert("feed_rate".to_string(), feed);
        cols.insert("mill_power".to_string(), power);
        cols.insert("ore_hardness".to_string(), hardness);
        cols.insert("product_size".to_string(), size);
        mgr.train(&TrainingTable::new(cols).unwrap(), 0.2).unwrap();
        mgr
    }

    fn mv(feed: f64) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("feed_rate".to_string(), feed);
        m
    }

    fn dv(hardness: f64) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("ore_hardness".to_string(), hardness);
        m
    }

    #[test]
    fn single_objective_feasible_scores_signed_target() {
        let mgr = make_manager(20.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };

        let minimize = SingleObjective {
            direction: Direction::Minimize,
        };
        let trial = minimize.score(&ctx, mv(3.0)).unwrap();
        assert!(trial.feasible);
        // target ≈ 6 + 2 + 1 = 9
        assert!((trial.objective.scalar() - 9.0).abs() < 0.5);

        let maximize = SingleObjective {
            direction: Direction::Maximize,
        };
        let trial = maximize.score(&ctx, mv(3.0)).unwrap();
        assert!((trial.objective.scalar() + 9.0).abs() < 0.5);
    }

    #[test]
    fn infeasible_never_outranks_feasible_even_when_maximizing() {
        let mgr = make_manager(10.0); // feed > 5 drives power out of bounds
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        let mode = SingleObjective {
            direction: Direction::Maximize,
        };

        let feasible = mode.score(&ctx, mv(4.0)).unwrap();
        let infeasible = mode.score(&ctx, mv(9.5)).unwrap();
        assert!(feasible.feasible);
        assert!(!infeasible.feasible);
        assert!(infeasible.objective.scalar() > feasible.objective.scalar());
    }

    #[test]
    fn pareto_front_contains_no_dominated_points() {
        let mgr = make_manager(20.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        let mut weights = BTreeMap::new();
        weights.insert("feed_rate".to_string(), 1.0);
        let mode = Pareto {
            direction: Direction::Minimize,
            cost_weights: weights,
        };

        let trials: Vec<Trial> = (0..20)
            .map(|i| mode.score(&ctx, mv(f64::from(i) / 2.0)).unwrap())
            .collect();
        let best = trials[0].clone();
        let ModeDetail::Pareto { front } = mode.detail(&ctx, &trials, &best).unwrap() else {
            panic!("wrong detail variant");
        };

        assert!(!front.is_empty());
        for (i, a) in front.iter().enumerate() {
            for (j, b) in front.iter().enumerate() {
                if i != j {
                    assert!(!a.dominates(b), "front point {j} is dominated");
                }
            }
        }
    }

    #[test]
    fn robust_gate_marks_trial_infeasible() {
        // CV bound [0, 10]: feed 9.5 → power ≈ 19 infeasible in every scenario
        let mgr = make_manager(10.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        let mode = Robust {
            direction: Direction::Minimize,
            scenarios: vec![dv(1.0), dv(3.0), dv(5.0)],
            feasibility_threshold: Some(0.8),
        };

        let gated = mode.score(&ctx, mv(9.5)).unwrap();
        assert!(!gated.feasible);
        assert!(gated.objective.scalar() >= defaults::INFEASIBLE_SENTINEL);

        let clean = mode.score(&ctx, mv(3.0)).unwrap();
        assert!(clean.feasible);
        assert!(clean.objective.scalar() < gated.objective.scalar());
    }

    #[test]
    fn robust_composite_weights_mean_and_worst() {
        let mgr = make_manager(20.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        let mode = Robust {
            direction: Direction::Minimize,
            scenarios: vec![dv(1.0), dv(5.0)],
            feasibility_threshold: Some(0.5),
        };

        // feed 3 → power ≈ 6; targets ≈ 8 and 12; composite = 0.7*10 + 0.3*12
        let trial = mode.score(&ctx, mv(3.0)).unwrap();
        assert!((trial.objective.scalar() - 10.6).abs() < 0.5);

        // Carried prediction is the worst-case scenario's
        let pred = trial.prediction.unwrap();
        assert!((pred.predicted_target - 12.0).abs() < 0.5);
    }

    #[test]
    fn robust_summary_reports_scenario_envelope() {
        let mgr = make_manager(20.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        let mode = Robust {
            direction: Direction::Minimize,
            scenarios: vec![dv(1.0), dv(3.0)],
            feasibility_threshold: Some(0.5),
        };
        let best = mode.score(&ctx, mv(2.0)).unwrap();
        let ModeDetail::Robust { summary } = mode.detail(&ctx, &[best.clone()], &best).unwrap()
        else {
            panic!("wrong detail variant");
        };
        assert_eq!(summary.scenario_count, 2);
        assert_eq!(summary.feasible_fraction, 1.0);
        // feed 2 → power 4; targets ≈ 6 and 8
        assert!((summary.mean_target - 7.0).abs() < 0.5);
        assert!((summary.worst_target - 8.0).abs() < 0.5);
    }

    #[test]
    fn target_seeking_scores_distance_to_desired() {
        let mgr = make_manager(20.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        let mode = TargetSeeking {
            desired_target: 10.0,
            tolerance_fraction: 0.05,
        };

        // feed 3.5 → target ≈ 10; feed 1 → target ≈ 5
        let near = mode.score(&ctx, mv(3.5)).unwrap();
        let far = mode.score(&ctx, mv(1.0)).unwrap();
        assert!(near.objective.scalar() < far.objective.scalar());
        assert!(near.objective.scalar() < 1.0);
    }

    #[test]
    fn target_seeking_analysis_flags_relaxed_fallback() {
        let mgr = make_manager(20.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        // Desired target far above anything the plant can reach
        let mode = TargetSeeking {
            desired_target: 500.0,
            tolerance_fraction: 0.01,
        };
        let trials: Vec<Trial> = (0..10)
            .map(|i| mode.score(&ctx, mv(f64::from(i))).unwrap())
            .collect();
        let best = trials
            .iter()
            .min_by(|a, b| {
                a.objective
                    .scalar()
                    .partial_cmp(&b.objective.scalar())
                    .unwrap()
            })
            .unwrap()
            .clone();

        let ModeDetail::TargetSeeking { analysis } =
            mode.detail(&ctx, &trials, &best).unwrap()
        else {
            panic!("wrong detail variant");
        };
        assert!(analysis.relaxed);
        assert_eq!(analysis.successful_trial_count, 0);
        assert!(!analysis.mv_distributions.is_empty());
    }

    #[test]
    fn target_seeking_distributions_cluster_near_solution() {
        let mgr = make_manager(20.0);
        let bundle = mgr.bundle().unwrap();
        let dvs = dv(2.0);
        let ctx = TrialContext {
            manager: &mgr,
            bundle: &bundle,
            dv_values: &dvs,
            constraint_mode: ConstraintMode::Hard,
            sentinel: defaults::INFEASIBLE_SENTINEL,
        };
        // target = 2*feed + 2 + 1, so desired 10 ⇔ feed 3.5
        let mode = TargetSeeking {
            desired_target: 10.0,
            tolerance_fraction: 0.05,
        };
        let trials: Vec<Trial> = (0..100)
            .map(|i| mode.score(&ctx, mv(f64::from(i) / 10.0)).unwrap())
            .collect();
        let best = trials
            .iter()
            .min_by(|a, b| {
                a.objective
                    .scalar()
                    .partial_cmp(&b.objective.scalar())
                    .unwrap()
            })
            .unwrap()
            .clone();

        let ModeDetail::TargetSeeking { analysis } =
            mode.detail(&ctx, &trials, &best).unwrap()
        else {
            panic!("wrong detail variant");
        };
        assert!(!analysis.relaxed);
        assert!(analysis.successful_trial_count > 0);
        let feed = &analysis.mv_distributions["feed_rate"];
        assert!((feed.median - 3.5).abs() < 0.5, "median {}", feed.median);
        let power = &analysis.cv_distributions["mill_power"];
        assert!((power.median - 7.0).abs() < 1.0, "median {}", power.median);
    }
}
