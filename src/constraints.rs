//! Constraint evaluation for predicted CVs (and optionally the target).
//!
//! Hard mode marks any out-of-bounds value infeasible and still produces a
//! continuous quadratic penalty, so a search keeps gradient signal while
//! infeasible. Soft mode allows a tolerance band around each bound before
//! penalty accrues; feasibility there means "penalty below a threshold",
//! not zero-violation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config;
use crate::config::defaults;
use crate::types::{ConstraintViolation, VariableRegistry};

/// How bound excursions are judged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstraintMode {
    /// Any excursion is infeasible.
    Hard,
    /// A tolerance band (fraction of bound width) is free; penalty is
    /// quadratic past the band. `None` uses the configured per-variable
    /// tolerance.
    Soft {
        tolerance_fraction: Option<f64>,
    },
}

/// Outcome of checking one value map against registry bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintReport {
    pub is_feasible: bool,
    pub violations: Vec<ConstraintViolation>,
    /// Continuous penalty: Σ factor × (distance beyond allowed band)².
    pub penalty: f64,
}

fn cfg_penalty_factor(variable_id: &str) -> f64 {
    if config::is_initialized() {
        config::get().constraints.penalty_factor_for(variable_id)
    } else {
        defaults::PENALTY_FACTOR
    }
}

fn cfg_tolerance_fraction(variable_id: &str) -> f64 {
    if config::is_initialized() {
        config::get().constraints.tolerance_fraction_for(variable_id)
    } else {
        defaults::SOFT_TOLERANCE_FRACTION
    }
}

fn cfg_soft_threshold() -> f64 {
    if config::is_initialized() {
        config::get().constraints.soft_feasibility_threshold
    } else {
        defaults::SOFT_FEASIBILITY_THRESHOLD
    }
}

/// Stateless evaluator over registry bounds.
pub struct ConstraintEvaluator;

impl ConstraintEvaluator {
    /// Check predicted values against their registry bounds.
    ///
    /// Values whose id is not in the registry are ignored: the registry is
    /// the single source of truth for what is constrained.
    pub fn check(
        registry: &VariableRegistry,
        values: &BTreeMap<String, f64>,
        mode: ConstraintMode,
    ) -> ConstraintReport {
        let mut violations = Vec::new();
        let mut penalty = 0.0;

        for (id, &value) in values {
            let Some(spec) = registry.get(id) else {
                continue;
            };

            let band = match mode {
                ConstraintMode::Hard => 0.0,
                ConstraintMode::Soft { tolerance_fraction } => {
                    tolerance_fraction.unwrap_or_else(|| cfg_tolerance_fraction(id)) * spec.span()
                }
            };

            let low_edge = spec.lower_bound - band;
            let high_edge = spec.upper_bound + band;
            let excess = if value < low_edge {
                low_edge - value
            } else if value > high_edge {
                value - high_edge
            } else {
                0.0
            };

            if excess > 0.0 {
                violations.push(ConstraintViolation {
                    variable_id: id.clone(),
                    predicted_value: value,
                    bound: (spec.lower_bound, spec.upper_bound),
                });
                penalty += cfg_penalty_factor(id) * excess * excess;
            }
        }

        let is_feasible = match mode {
            ConstraintMode::Hard => violations.is_empty(),
            ConstraintMode::Soft { .. } => penalty < cfg_soft_threshold(),
        };

        ConstraintReport {
            is_feasible,
            violations,
            penalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VariableRole, VariableSpec};

    fn registry() -> VariableRegistry {
        VariableRegistry::new(vec![
            VariableSpec {
                id: "feed_rate".to_string(),
                role: VariableRole::Mv,
                lower_bound: 0.0,
                upper_bound: 10.0,
                unit: "t/h".to_string(),
            },
            VariableSpec {
                id: "mill_power".to_string(),
                role: VariableRole::Cv,
                lower_bound: 0.0,
                upper_bound: 20.0,
                unit: "kW".to_string(),
            },
            VariableSpec {
                id: "product_size".to_string(),
                role: VariableRole::Target,
                lower_bound: 0.0,
                upper_bound: 100.0,
                unit: "um".to_string(),
            },
        ])
        .unwrap()
    }

    fn values(power: f64) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("mill_power".to_string(), power);
        m
    }

    #[test]
    fn hard_in_bounds_is_feasible_zero_penalty() {
        let report = ConstraintEvaluator::check(&registry(), &values(10.0), ConstraintMode::Hard);
        assert!(report.is_feasible);
        assert!(report.violations.is_empty());
        assert_eq!(report.penalty, 0.0);
    }

    #[test]
    fn hard_out_of_bounds_records_violation_and_penalty() {
        let report = ConstraintEvaluator::check(&registry(), &values(22.0), ConstraintMode::Hard);
        assert!(!report.is_feasible);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].bound, (0.0, 20.0));
        // excess = 2.0, penalty = 1000 * 4
        assert!((report.penalty - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn penalty_grows_quadratically() {
        let near = ConstraintEvaluator::check(&registry(), &values(21.0), ConstraintMode::Hard);
        let far = ConstraintEvaluator::check(&registry(), &values(23.0), ConstraintMode::Hard);
        assert!((far.penalty / near.penalty - 9.0).abs() < 1e-9);
    }

    #[test]
    fn soft_tolerates_band_then_penalizes() {
        let mode = ConstraintMode::Soft {
            tolerance_fraction: Some(0.05),
        };
        // Band = 0.05 * 20 = 1.0, so 20.9 is tolerated
        let inside = ConstraintEvaluator::check(&registry(), &values(20.9), mode);
        assert!(inside.is_feasible);
        assert_eq!(inside.penalty, 0.0);

        // 21.5 is 0.5 past the band
        let outside = ConstraintEvaluator::check(&registry(), &values(21.5), mode);
        assert!(!outside.is_feasible);
        assert!((outside.penalty - 1000.0 * 0.25).abs() < 1e-9);
    }

    #[test]
    fn soft_feasibility_is_threshold_based() {
        let mode = ConstraintMode::Soft {
            tolerance_fraction: Some(0.05),
        };
        // Tiny excursion past the band: penalty below the default threshold
        let report = ConstraintEvaluator::check(&registry(), &values(21.0005), mode);
        assert!(!report.violations.is_empty());
        assert!(report.penalty < 1.0);
        assert!(report.is_feasible, "penalty {} under threshold", report.penalty);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut v = values(10.0);
        v.insert("unregistered".to_string(), 1e9);
        let report = ConstraintEvaluator::check(&registry(), &v, ConstraintMode::Hard);
        assert!(report.is_feasible);
    }

    #[test]
    fn low_side_excursion_counts_too() {
        let report = ConstraintEvaluator::check(&registry(), &values(-1.0), ConstraintMode::Hard);
        assert!(!report.is_feasible);
        assert!((report.penalty - 1000.0).abs() < 1e-9);
    }
}
