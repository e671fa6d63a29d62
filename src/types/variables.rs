//! Variable catalog: identities, roles, bounds, and units for one grinding circuit.
//!
//! The registry is built once at startup and never mutated. Every other
//! subsystem looks variables up by id, so an invalid catalog is a fatal
//! configuration error, not something to limp past.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Role a variable plays in the two-stage cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableRole {
    /// Manipulated variable — an input the control system can directly set.
    Mv,
    /// Controlled variable — measured intermediate, predicted from MVs,
    /// subject to operating constraints.
    Cv,
    /// Disturbance variable — slow-changing external context for the
    /// quality prediction.
    Dv,
    /// Final quality/performance metric being optimized.
    Target,
}

impl std::fmt::Display for VariableRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mv => write!(f, "MV"),
            Self::Cv => write!(f, "CV"),
            Self::Dv => write!(f, "DV"),
            Self::Target => write!(f, "TARGET"),
        }
    }
}

/// Static description of one process variable.
///
/// Invariant: `lower_bound < upper_bound`, enforced at registry construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Unique identifier, matching the training-table column name exactly.
    pub id: String,
    /// Cascade role.
    pub role: VariableRole,
    /// Lower operating bound.
    pub lower_bound: f64,
    /// Upper operating bound.
    pub upper_bound: f64,
    /// Engineering unit (e.g., "t/h", "m3/h", "kWh/t").
    pub unit: String,
}

impl VariableSpec {
    /// Width of the operating range.
    pub fn span(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    /// Clamp a value into the operating range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower_bound, self.upper_bound)
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Variable {0}: lower bound {1} is not below upper bound {2}")]
    InvertedBounds(String, f64, f64),

    #[error("Duplicate variable id: {0}")]
    DuplicateId(String),

    #[error("Registry has no variable with role {0}")]
    MissingRole(VariableRole),

    #[error("Registry must declare exactly one TARGET variable, found {0}")]
    TargetCount(usize),

    #[error("Variable bound is not finite: {0}")]
    NonFiniteBound(String),

    #[error("IO error reading variable catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in variable catalog: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Immutable catalog of all variables for one production unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRegistry {
    variables: BTreeMap<String, VariableSpec>,
}

/// On-disk shape of the variable catalog TOML file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    variable: Vec<VariableSpec>,
}

impl VariableRegistry {
    /// Build a registry, validating every spec.
    ///
    /// Fails fast on inverted bounds, duplicate ids, non-finite bounds, a
    /// missing MV/CV role, or anything other than exactly one Target.
    pub fn new(specs: Vec<VariableSpec>) -> Result<Self, ConfigurationError> {
        let mut variables = BTreeMap::new();
        for spec in specs {
            if !spec.lower_bound.is_finite() || !spec.upper_bound.is_finite() {
                return Err(ConfigurationError::NonFiniteBound(spec.id));
            }
            if spec.lower_bound >= spec.upper_bound {
                return Err(ConfigurationError::InvertedBounds(
                    spec.id,
                    spec.lower_bound,
                    spec.upper_bound,
                ));
            }
            if variables.contains_key(&spec.id) {
                return Err(ConfigurationError::DuplicateId(spec.id));
            }
            variables.insert(spec.id.clone(), spec);
        }

        let registry = Self { variables };
        if registry.mv_ids().is_empty() {
            return Err(ConfigurationError::MissingRole(VariableRole::Mv));
        }
        if registry.cv_ids().is_empty() {
            return Err(ConfigurationError::MissingRole(VariableRole::Cv));
        }
        let target_count = registry.ids_with_role(VariableRole::Target).len();
        if target_count != 1 {
            return Err(ConfigurationError::TargetCount(target_count));
        }
        Ok(registry)
    }

    /// Load the catalog from a TOML file with `[[variable]]` tables.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path)?;
        let file: CatalogFile = toml::from_str(&text)?;
        Self::new(file.variable)
    }

    /// Look up a variable spec by id.
    pub fn get(&self, id: &str) -> Option<&VariableSpec> {
        self.variables.get(id)
    }

    /// All ids with the given role, in deterministic (sorted) order.
    ///
    /// Deterministic ordering matters: model `input_order` vectors are built
    /// from these lists at training time and replayed at inference.
    pub fn ids_with_role(&self, role: VariableRole) -> Vec<String> {
        self.variables
            .values()
            .filter(|v| v.role == role)
            .map(|v| v.id.clone())
            .collect()
    }

    /// Manipulated variable ids.
    pub fn mv_ids(&self) -> Vec<String> {
        self.ids_with_role(VariableRole::Mv)
    }

    /// Controlled variable ids.
    pub fn cv_ids(&self) -> Vec<String> {
        self.ids_with_role(VariableRole::Cv)
    }

    /// Disturbance variable ids.
    pub fn dv_ids(&self) -> Vec<String> {
        self.ids_with_role(VariableRole::Dv)
    }

    /// The single target variable id.
    pub fn target_id(&self) -> &str {
        // Registry construction guarantees exactly one Target.
        self.variables
            .values()
            .find(|v| v.role == VariableRole::Target)
            .map(|v| v.id.as_str())
            .unwrap_or("")
    }

    /// Total variable count.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterate all specs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableSpec> {
        self.variables.values()
    }
}
