//! Plant Configuration Module
//!
//! Provides per-plant engine configuration loaded from TOML files, replacing
//! hardcoded training/constraint/search constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `GRINDSIGHT_CONFIG` environment variable (path to TOML file)
//! 2. `plant_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(PlantConfig::load());
//!
//! // Anywhere in the codebase:
//! let factor = config::get().constraints.penalty_factor;
//! ```

pub mod defaults;
mod plant_config;

pub use plant_config::*;

use std::sync::OnceLock;

/// Global plant configuration, initialized once at startup.
static PLANT_CONFIG: OnceLock<PlantConfig> = OnceLock::new();

/// Initialize the global plant configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: PlantConfig) {
    if PLANT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global plant configuration.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
pub fn get() -> &'static PlantConfig {
    PLANT_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and library-only callers, which fall back to the
/// built-in defaults when no config was loaded.
pub fn is_initialized() -> bool {
    PLANT_CONFIG.get().is_some()
}
