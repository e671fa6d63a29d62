//! Grindsight: cascade prediction and constrained optimization for grinding
//! circuits.
//!
//! ## Architecture
//!
//! - **Cascade**: two-stage forward model — process models map MVs to CVs,
//!   a quality model maps (CVs, DVs) to the target metric
//! - **Constraints**: hard/soft bound evaluation with continuous penalties
//! - **Optimizer**: sequential model-based search in four modes
//!   (single-objective, Pareto, robust multi-scenario, target-seeking)
//! - **Planner**: staged rollout from the current to the optimal setting

pub mod cascade;
pub mod config;
pub mod constraints;
pub mod dataset;
pub mod optimizer;
pub mod regression;
pub mod scaling;
pub mod types;

// Re-export plant configuration
pub use config::PlantConfig;

// Re-export commonly used types
pub use types::{
    CascadePrediction, ConfigurationError, ConstraintViolation, Direction, FitReport,
    ImplementationStage, ModeDetail, ObjectiveValue, OptimizationResult, ParameterDistribution,
    ParetoPoint, RobustSummary, TargetSeekingAnalysis, TrainReport, Trial, VariableRegistry,
    VariableRole, VariableSpec,
};

// Re-export cascade components
pub use cascade::{CascadeBundle, CascadeModelManager, PredictionError, TrainError};

// Re-export constraint evaluation
pub use constraints::{ConstraintEvaluator, ConstraintMode, ConstraintReport};

// Re-export data handling
pub use dataset::{DataError, TrainingTable};

// Re-export optimizer components
pub use optimizer::{
    create_implementation_plan, OptimizationEngine, OptimizationError, Pareto, PlanError, Robust,
    SearchMode, SearchSettings, SingleObjective, TargetSeeking,
};

// Re-export regression capability
pub use regression::{EnsembleRegressor, RegressionError, Regressor, RidgeRegressor};
