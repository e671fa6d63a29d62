//! Core domain types: variable catalog, cascade predictions, optimization results.

mod optimization;
mod prediction;
mod variables;

pub use optimization::*;
pub use prediction::*;
pub use variables::*;
