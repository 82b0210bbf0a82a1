//! Hardware facts, tier classification and per-tier lookup tables
//!
//! Everything in this module is either a one-shot probe or a pure function
//! of the probed facts.

mod resources;
pub mod classifier;
pub mod policy;
pub mod strategy;

pub use resources::*;
pub use classifier::{classify, DeviceClass, TierThresholds};
pub use policy::{level_for, OptimizationLevel};
pub use strategy::{strategy_for, strategy_profile, Dimension};
