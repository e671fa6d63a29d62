//! Cascade model manager: training orchestration and the MV→CV→Target
//! forward prediction.
//!
//! ## Architecture
//!
//! - `ProcessModel`: one trained regressor per CV, mapping the MV vector to
//!   that CV. `input_order` is fixed at training time and stored on the model
//!   itself — it is replayed identically at inference, never reconstructed at
//!   call sites.
//! - `QualityModel`: one regressor mapping (CVs, DVs) to the target.
//! - `CascadeBundle`: the immutable set of trained models for one production
//!   unit. Retraining builds a brand-new bundle and publishes it with an
//!   atomic swap; in-flight calls keep using the snapshot they acquired.

use arc_swap::ArcSwapOption;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config;
use crate::config::defaults;
use crate::constraints::{ConstraintEvaluator, ConstraintMode};
use crate::dataset::{DataError, TrainingTable};
use crate::regression::{fit_metrics, EnsembleRegressor, RegressionError, Regressor};
use crate::scaling::FeatureScaler;
use crate::types::{
    CascadePrediction, FitReport, TrainReport, VariableRegistry,
};

/// Base seed for ensemble training. Per-model seeds are offset from this so
/// repeated training on identical data publishes identical bundles.
const TRAIN_SEED: u64 = 0x6f11_57a7;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Missing feature {0} required by model {1} — refusing to default it")]
    MissingFeature(String, String),

    #[error("No trained cascade bundle available — train or load models first")]
    ModelNotTrained,

    #[error("Model {0} produced a non-finite prediction")]
    NonFinitePrediction(String),
}

impl PredictionError {
    /// Whether this failure is recoverable at the trial level inside a
    /// search loop. Missing features and an untrained model mean the model
    /// is not usable at all; retry-per-trial does not apply.
    pub fn is_trial_recoverable(&self) -> bool {
        matches!(self, Self::NonFinitePrediction(_))
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Regression fit failed for {0}: {1}")]
    Regression(String, RegressionError),
}

/// Trained regressor for one CV, with its fixed input ordering and scaler.
#[derive(Debug)]
pub struct ProcessModel {
    pub cv_id: String,
    /// MV ids in training order. Replayed identically at inference;
    /// a mismatched order is a correctness bug, not a performance issue.
    pub input_order: Vec<String>,
    pub regressor: Box<dyn Regressor>,
    pub scaler: FeatureScaler,
}

/// Trained regressor for the target, over concatenated CVs and DVs.
#[derive(Debug)]
pub struct QualityModel {
    pub target_id: String,
    /// CV ids followed by DV ids, in training order.
    pub input_order: Vec<String>,
    pub regressor: Box<dyn Regressor>,
    pub scaler: FeatureScaler,
    pub uncertainty_capable: bool,
}

/// Immutable set of trained models for one production unit.
#[derive(Debug)]
pub struct CascadeBundle {
    pub process_models: BTreeMap<String, ProcessModel>,
    pub quality_model: QualityModel,
    pub version: u64,
}

fn cfg_min_rows() -> usize {
    if config::is_initialized() {
        config::get().training.min_training_rows
    } else {
        defaults::MIN_TRAINING_ROWS
    }
}

fn cfg_lambda() -> f64 {
    if config::is_initialized() {
        config::get().training.ridge_lambda
    } else {
        defaults::RIDGE_LAMBDA
    }
}

fn cfg_ensemble_size() -> usize {
    if config::is_initialized() {
        config::get().training.ensemble_size
    } else {
        defaults::ENSEMBLE_SIZE
    }
}

fn cfg_sentinel() -> f64 {
    if config::is_initialized() {
        config::get().optimization.infeasible_sentinel
    } else {
        defaults::INFEASIBLE_SENTINEL
    }
}

/// Fit one sub-model: scaler on the training head, ensemble ridge on scaled
/// inputs, metrics on the held-out tail.
fn fit_sub_model(
    table: &TrainingTable,
    input_ids: &[String],
    output_id: &str,
    test_fraction: f64,
    seed: u64,
) -> Result<(FeatureScaler, EnsembleRegressor, FitReport), TrainError> {
    let boundary = table.split_boundary(test_fraction);
    if boundary < cfg_min_rows() {
        return Err(DataError::InsufficientRows(boundary, cfg_min_rows()).into());
    }

    let x_train = table.matrix(input_ids, 0..boundary)?;
    let y_train = table.vector(output_id, 0..boundary)?;
    let x_test = table.matrix(input_ids, boundary..table.len())?;
    let y_test = table.vector(output_id, boundary..table.len())?;

    let scaler = FeatureScaler::fit(&x_train);
    let x_train_scaled = scaler.transform_matrix(&x_train);
    let regressor = EnsembleRegressor::fit(
        &x_train_scaled,
        &y_train,
        cfg_lambda(),
        cfg_ensemble_size(),
        seed,
    )
    .map_err(|e| TrainError::Regression(output_id.to_string(), e))?;

    let x_test_scaled = scaler.transform_matrix(&x_test);
    let (r_squared, rmse) = fit_metrics(&regressor, &x_test_scaled, &y_test);

    let weights = regressor.feature_weights();
    let total: f64 = weights.iter().map(|w| w.abs()).sum::<f64>().max(1e-12);
    let feature_importance = input_ids
        .iter()
        .zip(weights.iter())
        .map(|(id, w)| (id.clone(), w.abs() / total))
        .collect();

    let report = FitReport {
        r_squared,
        rmse,
        n_train: boundary,
        n_test: table.len() - boundary,
        feature_importance,
    };

    debug!(
        output = output_id,
        r_squared = report.r_squared,
        rmse = report.rmse,
        "Fitted sub-model"
    );

    Ok((scaler, regressor, report))
}

/// Train one ProcessModel per CV present in the training table, using every
/// MV as input. Returns the models plus per-CV fit metrics.
pub fn train_process_models(
    registry: &VariableRegistry,
    table: &TrainingTable,
    test_fraction: f64,
) -> Result<(BTreeMap<String, ProcessModel>, BTreeMap<String, FitReport>), TrainError> {
    let mv_ids = registry.mv_ids();
    let mut models = BTreeMap::new();
    let mut reports = BTreeMap::new();

    for (idx, cv_id) in registry.cv_ids().into_iter().enumerate() {
        if !table.has_column(&cv_id) {
            debug!(cv = %cv_id, "CV column absent from training table, skipping");
            continue;
        }
        let (scaler, regressor, report) = fit_sub_model(
            table,
            &mv_ids,
            &cv_id,
            test_fraction,
            TRAIN_SEED.wrapping_add(idx as u64),
        )?;
        reports.insert(cv_id.clone(), report);
        models.insert(
            cv_id.clone(),
            ProcessModel {
                cv_id,
                input_order: mv_ids.clone(),
                regressor: Box::new(regressor),
                scaler,
            },
        );
    }

    Ok((models, reports))
}

/// Train the QualityModel on all available CVs and DVs against the target.
pub fn train_quality_model(
    registry: &VariableRegistry,
    table: &TrainingTable,
    test_fraction: f64,
) -> Result<(QualityModel, FitReport), TrainError> {
    let target_id = registry.target_id().to_string();
    if !table.has_column(&target_id) {
        return Err(DataError::MissingColumn(target_id).into());
    }

    let mut input_order: Vec<String> = registry
        .cv_ids()
        .into_iter()
        .filter(|id| table.has_column(id))
        .collect();
    input_order.extend(
        registry
            .dv_ids()
            .into_iter()
            .filter(|id| table.has_column(id)),
    );

    let (scaler, regressor, report) = fit_sub_model(
        table,
        &input_order,
        &target_id,
        test_fraction,
        TRAIN_SEED.wrapping_add(0x9000),
    )?;

    let model = QualityModel {
        target_id,
        input_order,
        regressor: Box::new(regressor),
        scaler,
        uncertainty_capable: true,
    };
    Ok((model, report))
}

/// Owns the published bundle for one production unit and computes the
/// forward cascade. Training replaces the bundle wholesale; prediction and
/// optimization read lock-free snapshots.
pub struct CascadeModelManager {
    registry: Arc<VariableRegistry>,
    bundle: ArcSwapOption<CascadeBundle>,
    next_version: AtomicU64,
}

impl CascadeModelManager {
    pub fn new(registry: Arc<VariableRegistry>) -> Self {
        Self {
            registry,
            bundle: ArcSwapOption::const_empty(),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Snapshot of the current bundle. Callers hold the snapshot for the
    /// duration of their work; a concurrent retrain never mutates it.
    pub fn bundle(&self) -> Result<Arc<CascadeBundle>, PredictionError> {
        self.bundle
            .load_full()
            .ok_or(PredictionError::ModelNotTrained)
    }

    /// Whether a trained bundle has been published.
    pub fn is_trained(&self) -> bool {
        self.bundle.load().is_some()
    }

    /// Train every process model and the quality model, then publish the
    /// new bundle atomically.
    pub fn train(
        &self,
        table: &TrainingTable,
        test_fraction: f64,
    ) -> Result<TrainReport, TrainError> {
        let (process_models, process_reports) =
            train_process_models(&self.registry, table, test_fraction)?;
        let (quality_model, quality_report) =
            train_quality_model(&self.registry, table, test_fraction)?;

        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let bundle = CascadeBundle {
            process_models,
            quality_model,
            version,
        };
        self.bundle.store(Some(Arc::new(bundle)));

        info!(
            version,
            rows = table.len(),
            cvs = process_reports.len(),
            "Published new cascade bundle"
        );

        Ok(TrainReport {
            process_reports,
            quality_report,
            bundle_version: version,
            trained_at: chrono::Utc::now(),
        })
    }

    /// Install an externally loaded bundle (model persistence is an external
    /// collaborator; the engine just accepts the loaded object).
    pub fn install_bundle(&self, process_models: BTreeMap<String, ProcessModel>, quality_model: QualityModel) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.bundle.store(Some(Arc::new(CascadeBundle {
            process_models,
            quality_model,
            version,
        })));
        version
    }

    /// Forward cascade against the current bundle snapshot, hard constraints.
    pub fn predict_cascade(
        &self,
        mv_values: &BTreeMap<String, f64>,
        dv_values: &BTreeMap<String, f64>,
    ) -> Result<CascadePrediction, PredictionError> {
        let bundle = self.bundle()?;
        self.predict_cascade_with(&bundle, mv_values, dv_values, ConstraintMode::Hard)
    }

    /// Forward cascade against an explicit bundle snapshot.
    ///
    /// 1. Validate that `mv_values` supplies every MV in every process
    ///    model's `input_order` — no silent defaulting.
    /// 2. Predict each CV through its scaler + regressor.
    /// 3. Evaluate constraints on the predicted CVs.
    /// 4. In hard mode, an infeasible CV stage short-circuits to the
    ///    sentinel target instead of extrapolating the quality model
    ///    outside its training envelope.
    /// 5. Otherwise run the quality model over (CVs, DVs).
    pub fn predict_cascade_with(
        &self,
        bundle: &CascadeBundle,
        mv_values: &BTreeMap<String, f64>,
        dv_values: &BTreeMap<String, f64>,
        mode: ConstraintMode,
    ) -> Result<CascadePrediction, PredictionError> {
        // Step 1: validate every required MV up front.
        for model in bundle.process_models.values() {
            for id in &model.input_order {
                if !mv_values.contains_key(id) {
                    return Err(PredictionError::MissingFeature(
                        id.clone(),
                        model.cv_id.clone(),
                    ));
                }
            }
        }

        // Step 2: predict each CV in its fixed input order.
        let mut predicted_cvs = BTreeMap::new();
        for (cv_id, model) in &bundle.process_models {
            let raw: Vec<f64> = model
                .input_order
                .iter()
                .map(|id| mv_values[id])
                .collect();
            let scaled = model.scaler.transform(&raw);
            let value = model.regressor.predict(&scaled);
            if !value.is_finite() {
                return Err(PredictionError::NonFinitePrediction(cv_id.clone()));
            }
            predicted_cvs.insert(cv_id.clone(), value);
        }

        // Step 3: constraint evaluation.
        let report = ConstraintEvaluator::check(&self.registry, &predicted_cvs, mode);

        // Step 4: hard-mode short-circuit.
        if !report.is_feasible && mode == ConstraintMode::Hard {
            return Ok(CascadePrediction {
                predicted_cvs,
                predicted_target: cfg_sentinel(),
                target_std: None,
                is_feasible: false,
                violations: report.violations,
                constraint_penalty: report.penalty,
            });
        }

        // Step 5: quality model over (CVs, DVs) in its fixed input order.
        let quality = &bundle.quality_model;
        let mut raw = Vec::with_capacity(quality.input_order.len());
        for id in &quality.input_order {
            if let Some(&v) = predicted_cvs.get(id) {
                raw.push(v);
            } else if let Some(&v) = dv_values.get(id) {
                raw.push(v);
            } else {
                return Err(PredictionError::MissingFeature(
                    id.clone(),
                    quality.target_id.clone(),
                ));
            }
        }
        let scaled = quality.scaler.transform(&raw);
        let (predicted_target, target_std) =
            match quality.regressor.predict_with_uncertainty(&scaled) {
                Some((mean, std)) => (mean, Some(std)),
                None => (quality.regressor.predict(&scaled), None),
            };
        if !predicted_target.is_finite() {
            return Err(PredictionError::NonFinitePrediction(
                quality.target_id.clone(),
            ));
        }

        Ok(CascadePrediction {
            predicted_cvs,
            predicted_target,
            target_std,
            is_feasible: report.is_feasible,
            violations: report.violations,
            constraint_penalty: report.penalty,
        })
    }

    /// Target prediction with an uncertainty estimate.
    ///
    /// Uses the quality regressor's native capability when present, and
    /// falls back to Monte-Carlo perturbation of the MV inputs otherwise.
    pub fn predict_target_with_uncertainty(
        &self,
        bundle: &CascadeBundle,
        mv_values: &BTreeMap<String, f64>,
        dv_values: &BTreeMap<String, f64>,
        seed: u64,
    ) -> Result<(f64, f64), PredictionError> {
        let base = self.predict_cascade_with(
            bundle,
            mv_values,
            dv_values,
            ConstraintMode::Soft {
                tolerance_fraction: None,
            },
        )?;
        if let Some(std) = base.target_std {
            return Ok((base.predicted_target, std));
        }

        // Monte-Carlo fallback: perturb MV inputs and observe target spread.
        use rand::{Rng, SeedableRng};
        let (n_samples, sigma) = if config::is_initialized() {
            let opt = &config::get().optimization;
            (opt.mc_perturbation_samples, opt.mc_perturbation_sigma)
        } else {
            (
                defaults::MC_PERTURBATION_SAMPLES,
                defaults::MC_PERTURBATION_SIGMA,
            )
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut targets = Vec::with_capacity(n_samples);
        for _ in 0..n_samples {
            let mut perturbed = mv_values.clone();
            for (id, v) in &mut perturbed {
                let span = self.registry.get(id).map_or(1.0, |s| s.span());
                *v += rng.gen_range(-1.0..1.0) * sigma * span;
            }
            let pred = self.predict_cascade_with(
                bundle,
                &perturbed,
                dv_values,
                ConstraintMode::Soft {
                    tolerance_fraction: None,
                },
            )?;
            targets.push(pred.predicted_target);
        }
        let n = targets.len() as f64;
        let mean = targets.iter().sum::<f64>() / n;
        let var = targets.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
        Ok((base.predicted_target, var.sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VariableRole, VariableSpec};

    fn spec(id: &str, role: VariableRole, lo: f64, hi: f64) -> VariableSpec {
        VariableSpec {
            id: id.to_string(),
            role,
            lower_bound: lo,
            upper_bound: hi,
            unit: String::new(),
        }
    }

    /// Fixed linear map without the uncertainty capability.
    #[derive(Debug)]
    struct PointLinear {
        weights: Vec<f64>,
        intercept: f64,
    }

    impl Regressor for PointLinear {
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

    /// Identity scaler: fit on {-1, +1} per dimension gives mean 0, scale 1.
    fn identity_scaler(dims: usize) -> FeatureScaler {
        FeatureScaler::fit(&[vec![-1.0; dims], vec![1.0; dims]])
    }

    fn registry() -> Arc<VariableRegistry> {
        Arc::new(
            VariableRegistry::new(vec![
                spec("feed_rate", VariableRole::Mv, 0.0, 10.0),
                spec("mill_power", VariableRole::Cv, 0.0, 20.0),
                spec("ore_hardness", VariableRole::Dv, 0.0, 10.0),
                spec("product_size", VariableRole::Target, -1e6, 1e6),
            ])
            .unwrap(),
        )
    }

    /// Synthetic plant: mill_power = 2*feed_rate, product_size = power + hardness + 1.
    fn table(rows: usize) -> TrainingTable {
        let feed: Vec<f64> = (0..rows).map(|i| (i % 100) as f64 / 10.0).collect();
        let power: Vec<f64> = feed.iter().map(|f| 2.0 * f).collect();
        let hardness: Vec<f64> = (0..rows).map(|i| (i % 7) as f64).collect();
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
        TrainingTable::new(cols).unwrap()
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
    fn untrained_manager_refuses_to_predict() {
        let mgr = CascadeModelManager::new(registry());
        let err = mgr.predict_cascade(&mv(5.0), &dv(3.0)).unwrap_err();
        assert!(matches!(err, PredictionError::ModelNotTrained));
        assert!(!err.is_trial_recoverable());
    }

    #[test]
    fn training_requires_minimum_rows() {
        let mgr = CascadeModelManager::new(registry());
        let err = mgr.train(&table(50), 0.2).unwrap_err();
        assert!(matches!(
            err,
            TrainError::Data(DataError::InsufficientRows(_, _))
        ));
    }

    #[test]
    fn trains_and_predicts_linear_plant() {
        let mgr = CascadeModelManager::new(registry());
        let report = mgr.train(&table(500), 0.2).unwrap();

        assert!(report.process_reports["mill_power"].r_squared > 0.99);
        assert!(report.quality_report.r_squared > 0.99);

        let pred = mgr.predict_cascade(&mv(3.0), &dv(2.0)).unwrap();
        // mill_power ≈ 6, product_size ≈ 6 + 2 + 1 = 9
        assert!((pred.predicted_cvs["mill_power"] - 6.0).abs() < 0.3);
        assert!((pred.predicted_target - 9.0).abs() < 0.5);
        assert!(pred.is_feasible);
        assert!(pred.target_std.is_some());
    }

    #[test]
    fn prediction_is_deterministic_for_fixed_bundle() {
        let mgr = CascadeModelManager::new(registry());
        mgr.train(&table(500), 0.2).unwrap();
        let a = mgr.predict_cascade(&mv(4.2), &dv(3.3)).unwrap();
        let b = mgr.predict_cascade(&mv(4.2), &dv(3.3)).unwrap();
        assert_eq!(a.predicted_target.to_bits(), b.predicted_target.to_bits());
        assert_eq!(
            a.predicted_cvs["mill_power"].to_bits(),
            b.predicted_cvs["mill_power"].to_bits()
        );
    }

    #[test]
    fn missing_mv_is_a_hard_error() {
        let mgr = CascadeModelManager::new(registry());
        mgr.train(&table(500), 0.2).unwrap();
        let err = mgr
            .predict_cascade(&BTreeMap::new(), &dv(1.0))
            .unwrap_err();
        assert!(matches!(err, PredictionError::MissingFeature(_, _)));
        assert!(!err.is_trial_recoverable());
    }

    #[test]
    fn missing_dv_is_a_hard_error() {
        let mgr = CascadeModelManager::new(registry());
        mgr.train(&table(500), 0.2).unwrap();
        let err = mgr
            .predict_cascade(&mv(3.0), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, PredictionError::MissingFeature(id, _) if id == "ore_hardness"));
    }

    #[test]
    fn missing_target_column_fails_quality_training() {
        let reg = registry();
        let full = table(500);
        let mut cols = BTreeMap::new();
        for id in ["feed_rate", "mill_power", "ore_hardness"] {
            cols.insert(id.to_string(), full.column(id).unwrap().to_vec());
        }
        let t = TrainingTable::new(cols).unwrap();
        let err = train_quality_model(&reg, &t, 0.2).unwrap_err();
        assert!(matches!(
            err,
            TrainError::Data(DataError::MissingColumn(id)) if id == "product_size"
        ));
    }

    #[test]
    fn hard_infeasible_short_circuits_to_sentinel() {
        // Narrow the power bound so feed = 9.5 → power ≈ 19 stays in, but
        // a registry with [0, 10] makes it infeasible.
        let reg = Arc::new(
            VariableRegistry::new(vec![
                spec("feed_rate", VariableRole::Mv, 0.0, 10.0),
                spec("mill_power", VariableRole::Cv, 0.0, 10.0),
                spec("ore_hardness", VariableRole::Dv, 0.0, 10.0),
                spec("product_size", VariableRole::Target, -1e6, 1e6),
            ])
            .unwrap(),
        );
        let mgr = CascadeModelManager::new(reg);
        mgr.train(&table(500), 0.2).unwrap();

        let pred = mgr.predict_cascade(&mv(9.0), &dv(1.0)).unwrap();
        assert!(!pred.is_feasible);
        assert_eq!(pred.violations.len(), 1);
        assert_eq!(pred.predicted_target, defaults::INFEASIBLE_SENTINEL);
        assert!(pred.target_std.is_none());
        assert!(pred.constraint_penalty > 0.0);
    }

    #[test]
    fn soft_mode_still_runs_quality_model_when_infeasible() {
        let reg = Arc::new(
            VariableRegistry::new(vec![
                spec("feed_rate", VariableRole::Mv, 0.0, 10.0),
                spec("mill_power", VariableRole::Cv, 0.0, 10.0),
                spec("ore_hardness", VariableRole::Dv, 0.0, 10.0),
                spec("product_size", VariableRole::Target, -1e6, 1e6),
            ])
            .unwrap(),
        );
        let mgr = CascadeModelManager::new(reg);
        mgr.train(&table(500), 0.2).unwrap();
        let bundle = mgr.bundle().unwrap();

        let pred = mgr
            .predict_cascade_with(
                &bundle,
                &mv(9.0),
                &dv(1.0),
                ConstraintMode::Soft {
                    tolerance_fraction: Some(0.05),
                },
            )
            .unwrap();
        // Far past the band: infeasible, but the target is a real model
        // output, not the sentinel.
        assert!(!pred.is_feasible);
        assert!((pred.predicted_target - defaults::INFEASIBLE_SENTINEL).abs() > 100.0);
    }

    #[test]
    fn retrain_publishes_new_version_and_old_snapshot_survives() {
        let mgr = CascadeModelManager::new(registry());
        let r1 = mgr.train(&table(500), 0.2).unwrap();
        let snapshot = mgr.bundle().unwrap();
        let r2 = mgr.train(&table(600), 0.2).unwrap();

        assert!(r2.bundle_version > r1.bundle_version);
        // The old snapshot is still fully usable.
        assert_eq!(snapshot.version, r1.bundle_version);
        let pred = mgr
            .predict_cascade_with(&snapshot, &mv(3.0), &dv(2.0), ConstraintMode::Hard)
            .unwrap();
        assert!(pred.predicted_target.is_finite());
        // And the manager now serves the new version.
        assert_eq!(mgr.bundle().unwrap().version, r2.bundle_version);
    }

    #[test]
    fn uncertainty_from_capable_regressor() {
        let mgr = CascadeModelManager::new(registry());
        mgr.train(&table(500), 0.2).unwrap();
        let bundle = mgr.bundle().unwrap();
        let (mean, std) = mgr
            .predict_target_with_uncertainty(&bundle, &mv(3.0), &dv(2.0), 1)
            .unwrap();
        assert!((mean - 9.0).abs() < 0.5);
        assert!(std >= 0.0);
    }

    #[test]
    fn uncertainty_falls_back_to_input_perturbation() {
        // Point-estimate regressors have no native std: the manager must
        // derive one by perturbing the MV inputs.
        let mgr = CascadeModelManager::new(registry());
        let mut process_models = BTreeMap::new();
        process_models.insert(
            "mill_power".to_string(),
            ProcessModel {
                cv_id: "mill_power".to_string(),
                input_order: vec!["feed_rate".to_string()],
                regressor: Box::new(PointLinear {
                    weights: vec![2.0],
                    intercept: 0.0,
                }),
                scaler: identity_scaler(1),
            },
        );
        let quality_model = QualityModel {
            target_id: "product_size".to_string(),
            input_order: vec!["mill_power".to_string(), "ore_hardness".to_string()],
            regressor: Box::new(PointLinear {
                weights: vec![1.0, 1.0],
                intercept: 1.0,
            }),
            scaler: identity_scaler(2),
            uncertainty_capable: false,
        };
        mgr.install_bundle(process_models, quality_model);
        let bundle = mgr.bundle().unwrap();

        let pred = mgr.predict_cascade(&mv(3.0), &dv(2.0)).unwrap();
        assert!(pred.target_std.is_none());

        // z = 2*feed + hardness + 1 exactly, so the mean is exact and the
        // spread comes purely from the perturbation.
        let (mean, std) = mgr
            .predict_target_with_uncertainty(&bundle, &mv(3.0), &dv(2.0), 5)
            .unwrap();
        assert!((mean - 9.0).abs() < 1e-9);
        assert!(std > 0.0, "perturbation spread must be positive");
        assert!(std < 1.0, "1% input sigma cannot produce a large spread");

        // Seeded, so the fallback estimate is reproducible.
        let (_, std2) = mgr
            .predict_target_with_uncertainty(&bundle, &mv(3.0), &dv(2.0), 5)
            .unwrap();
        assert_eq!(std.to_bits(), std2.to_bits());
    }

    #[test]
    fn feature_importance_sums_to_one() {
        let mgr = CascadeModelManager::new(registry());
        let report = mgr.train(&table(500), 0.2).unwrap();
        let total: f64 = report.quality_report.feature_importance.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
