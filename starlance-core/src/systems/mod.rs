//! Turn-resolution systems, one module per concern.
//!
//! Each system exposes `run_*` entry points called by the orchestrator in
//! phase order, plus the pure analyzers its tests exercise directly.

pub mod capacity;
pub mod combat;
pub mod construction;
pub mod diplomacy;
pub mod economy;
pub mod espionage;
pub mod fleet;
pub mod ground;
pub mod intel;
pub mod shortfall;

pub use capacity::{analyze_house_capacity, CapacitySeverity, CapacityViolation};
pub use combat::run_space_combat;
pub use economy::run_income_phase_for_house;
pub use shortfall::{apply_shortfall_cascade, process_shortfall, ShortfallCascade};
