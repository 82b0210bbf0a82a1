//! Runtime performance monitoring
//!
//! Samples CPU load and memory usage in the background and publishes the
//! latest reading for on-demand queries.

mod performance;
pub mod sampler;

pub use performance::*;
pub use sampler::{ResourceSampler, SysinfoSampler};
