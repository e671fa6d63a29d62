//! Staged rollout planning from a current to an optimal MV setting.
//!
//! Operators do not jump a mill to a new operating point in one move; the
//! planner produces linearly interpolated intermediate settings so the
//! transition can be walked in verified steps. This is a rollout aid, not a
//! search.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::ImplementationStage;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Implementation plan needs at least one step")]
    ZeroSteps,

    #[error("Current and optimal settings disagree on variable ids: {0}")]
    KeyMismatch(String),
}

/// Produce `steps + 1` stages: stage 0 equals `current` exactly, stage
/// `steps` equals `optimal` exactly, intermediates are linear interpolations
/// annotated with percent progress.
pub fn create_implementation_plan(
    current: &BTreeMap<String, f64>,
    optimal: &BTreeMap<String, f64>,
    steps: usize,
) -> Result<Vec<ImplementationStage>, PlanError> {
    if steps == 0 {
        return Err(PlanError::ZeroSteps);
    }
    if current.len() != optimal.len() || current.keys().any(|k| !optimal.contains_key(k)) {
        let missing: Vec<&str> = current
            .keys()
            .filter(|k| !optimal.contains_key(*k))
            .chain(optimal.keys().filter(|k| !current.contains_key(*k)))
            .map(String::as_str)
            .collect();
        return Err(PlanError::KeyMismatch(missing.join(", ")));
    }

    let mut stages = Vec::with_capacity(steps + 1);
    for step in 0..=steps {
        // Endpoints are exact copies, not interpolations, so no float drift
        // can creep into the boundary stages.
        let mv_values = if step == 0 {
            current.clone()
        } else if step == steps {
            optimal.clone()
        } else {
            let t = step as f64 / steps as f64;
            current
                .iter()
                .map(|(id, &from)| {
                    let to = optimal[id];
                    (id.clone(), from + (to - from) * t)
                })
                .collect()
        };
        stages.push(ImplementationStage {
            step,
            percent: step as f64 / steps as f64 * 100.0,
            mv_values,
        });
    }
    Ok(stages)
}
