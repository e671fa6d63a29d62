//! Plant configuration structures, TOML loading, and validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use super::defaults;

/// Top-level engine configuration for one grinding plant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlantConfig {
    pub training: TrainingConfig,
    pub constraints: ConstraintConfig,
    pub optimization: OptimizationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Minimum rows required after cleaning before a model will be fit.
    pub min_training_rows: usize,
    /// Default held-out fraction (time-ordered tail, never shuffled).
    pub default_test_fraction: f64,
    /// Ridge regularization strength.
    pub ridge_lambda: f64,
    /// Bootstrap members in an uncertainty-capable ensemble.
    pub ensemble_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_training_rows: defaults::MIN_TRAINING_ROWS,
            default_test_fraction: defaults::DEFAULT_TEST_FRACTION,
            ridge_lambda: defaults::RIDGE_LAMBDA,
            ensemble_size: defaults::ENSEMBLE_SIZE,
        }
    }
}

/// Per-variable constraint overrides. Any field left `None` falls back to the
/// global value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConstraintOverride {
    pub penalty_factor: Option<f64>,
    pub tolerance_fraction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Penalty factor applied to squared bound excursions.
    pub penalty_factor: f64,
    /// Soft-mode tolerance band as a fraction of the bound width.
    pub soft_tolerance_fraction: f64,
    /// Soft-mode feasibility threshold (penalty below this is feasible).
    pub soft_feasibility_threshold: f64,
    /// Per-variable overrides, keyed by variable id.
    pub overrides: BTreeMap<String, ConstraintOverride>,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            penalty_factor: defaults::PENALTY_FACTOR,
            soft_tolerance_fraction: defaults::SOFT_TOLERANCE_FRACTION,
            soft_feasibility_threshold: defaults::SOFT_FEASIBILITY_THRESHOLD,
            overrides: BTreeMap::new(),
        }
    }
}

impl ConstraintConfig {
    /// Effective penalty factor for a variable.
    pub fn penalty_factor_for(&self, variable_id: &str) -> f64 {
        self.overrides
            .get(variable_id)
            .and_then(|o| o.penalty_factor)
            .unwrap_or(self.penalty_factor)
    }

    /// Effective soft tolerance fraction for a variable.
    pub fn tolerance_fraction_for(&self, variable_id: &str) -> f64 {
        self.overrides
            .get(variable_id)
            .and_then(|o| o.tolerance_fraction)
            .unwrap_or(self.soft_tolerance_fraction)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Random trials before the surrogate sampler activates.
    pub n_startup_trials: usize,
    /// Quantile split between good and bad trials in the surrogate.
    pub sampler_gamma: f64,
    /// Candidates drawn per proposal.
    pub sampler_candidates: usize,
    /// Target value assigned to hard-infeasible predictions.
    pub infeasible_sentinel: f64,
    /// Weight on mean target across scenarios (robust mode).
    pub robust_mean_weight: f64,
    /// Weight on worst-case target across scenarios (robust mode).
    pub robust_worst_weight: f64,
    /// Default minimum fraction of feasible scenarios (robust mode).
    pub robust_feasibility_threshold: f64,
    /// Best-trial fraction when target-seeking finds zero strict successes.
    pub fallback_fraction: f64,
    /// Confidence band percentiles for parameter distributions.
    pub confidence_band: (u8, u8),
    /// Monte-Carlo samples for the uncertainty fallback.
    pub mc_perturbation_samples: usize,
    /// Relative input sigma for the Monte-Carlo fallback.
    pub mc_perturbation_sigma: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_startup_trials: defaults::N_STARTUP_TRIALS,
            sampler_gamma: defaults::SAMPLER_GAMMA,
            sampler_candidates: defaults::SAMPLER_CANDIDATES,
            infeasible_sentinel: defaults::INFEASIBLE_SENTINEL,
            robust_mean_weight: defaults::ROBUST_MEAN_WEIGHT,
            robust_worst_weight: defaults::ROBUST_WORST_WEIGHT,
            robust_feasibility_threshold: defaults::ROBUST_FEASIBILITY_THRESHOLD,
            fallback_fraction: defaults::FALLBACK_FRACTION,
            confidence_band: defaults::CONFIDENCE_BAND,
            mc_perturbation_samples: defaults::MC_PERTURBATION_SAMPLES,
            mc_perturbation_sigma: defaults::MC_PERTURBATION_SIGMA,
        }
    }
}

impl PlantConfig {
    /// Load configuration following the documented loading order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("GRINDSIGHT_CONFIG") {
            match Self::from_file(Path::new(&path)) {
                Ok(cfg) => {
                    info!(path = %path, "Loaded plant config from GRINDSIGHT_CONFIG");
                    return cfg;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to load GRINDSIGHT_CONFIG, trying fallbacks");
                }
            }
        }

        let local = Path::new("plant_config.toml");
        if local.exists() {
            match Self::from_file(local) {
                Ok(cfg) => {
                    info!("Loaded plant config from ./plant_config.toml");
                    return cfg;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse ./plant_config.toml, using defaults");
                }
            }
        }

        info!("Using built-in default plant config");
        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// Validate ranges, returning human-readable warnings for anything
    /// suspicious. Warnings do not block startup; hard errors are reserved
    /// for the variable registry.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.training.min_training_rows < 30 {
            warnings.push(format!(
                "training.min_training_rows = {} is very low; fit metrics will be unreliable",
                self.training.min_training_rows
            ));
        }
        if !(0.0..1.0).contains(&self.training.default_test_fraction) {
            warnings.push(format!(
                "training.default_test_fraction = {} outside [0, 1)",
                self.training.default_test_fraction
            ));
        }
        if self.constraints.penalty_factor <= 0.0 {
            warnings.push("constraints.penalty_factor must be positive".to_string());
        }
        if !(0.0..0.5).contains(&self.constraints.soft_tolerance_fraction) {
            warnings.push(format!(
                "constraints.soft_tolerance_fraction = {} outside [0, 0.5)",
                self.constraints.soft_tolerance_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.optimization.sampler_gamma) {
            warnings.push(format!(
                "optimization.sampler_gamma = {} outside [0, 1]",
                self.optimization.sampler_gamma
            ));
        }
        if !(0.0..=1.0).contains(&self.optimization.fallback_fraction)
            || self.optimization.fallback_fraction == 0.0
        {
            warnings.push(format!(
                "optimization.fallback_fraction = {} outside (0, 1]",
                self.optimization.fallback_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.optimization.robust_feasibility_threshold) {
            warnings.push(format!(
                "optimization.robust_feasibility_threshold = {} outside [0, 1]",
                self.optimization.robust_feasibility_threshold
            ));
        }
        let (lo, hi) = self.optimization.confidence_band;
        if lo >= hi || hi > 100 {
            warnings.push(format!(
                "optimization.confidence_band = ({lo}, {hi}) is not an ascending percentile pair"
            ));
        }

        warnings
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate_clean() {
        let cfg = PlantConfig::default();
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[training]
min_training_rows = 250

[constraints]
penalty_factor = 500.0

[constraints.overrides.mill_power]
tolerance_fraction = 0.10
"#
        )
        .unwrap();

        let cfg = PlantConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.training.min_training_rows, 250);
        assert_eq!(cfg.constraints.penalty_factor, 500.0);
        // Untouched sections keep defaults
        assert_eq!(
            cfg.optimization.n_startup_trials,
            defaults::N_STARTUP_TRIALS
        );
        // Per-variable override wins, others fall back
        assert_eq!(cfg.constraints.tolerance_fraction_for("mill_power"), 0.10);
        assert_eq!(
            cfg.constraints.tolerance_fraction_for("cyclone_pressure"),
            defaults::SOFT_TOLERANCE_FRACTION
        );
        assert_eq!(cfg.constraints.penalty_factor_for("mill_power"), 500.0);
    }

    #[test]
    fn validation_flags_bad_ranges() {
        let mut cfg = PlantConfig::default();
        cfg.training.default_test_fraction = 1.5;
        cfg.optimization.sampler_gamma = -0.1;
        cfg.optimization.confidence_band = (95, 5);
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3, "{warnings:?}");
    }
}
