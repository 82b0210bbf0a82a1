//! # TierScale - Adaptive Hardware Classification and Resource Sizing
//!
//! TierScale looks at two facts about a machine (logical core count and
//! total memory), places it in one of eight device tiers, derives an
//! optimization level from the tier, sizes a worker pool to the core count
//! and keeps a background sample of CPU and memory utilization.
//!
//! ## Features
//!
//! - **Tier Classification**: Calculator through Supercomputer, highest tier whose thresholds are met
//! - **Optimization Policy**: Fixed tier-to-level table (Minimal .. Extreme)
//! - **Strategy Selection**: Per-tier strategy names for memory, scheduling, display, network, filesystem
//! - **Affinity Scheduler**: One worker thread per core, bounded queue, per-task error isolation
//! - **Performance Monitor**: Periodic CPU/memory sampling with a degraded fallback
//!
//! ## Quick Start
//!
//! ```no_run
//! use tierscale::config::EngineConfig;
//! use tierscale::core::EngineContext;
//! use tierscale::system::SystemProbe;
//!
//! let ctx = EngineContext::bootstrap(&EngineConfig::default(), &SystemProbe::new()).unwrap();
//! println!("{} -> {}", ctx.device_class(), ctx.optimization_level());
//!
//! let handle = ctx.submit("sum", || Ok((1..=100u64).sum::<u64>())).unwrap();
//! assert_eq!(handle.wait().unwrap(), 5050);
//!
//! ctx.shutdown();
//! ```
//!
//! ## Classification Only
//!
//! ```
//! use tierscale::system::{classify, level_for, DeviceClass, HardwareFacts, OptimizationLevel};
//!
//! let facts = HardwareFacts::new(4, 10 * 1024 * 1024 * 1024, "example").unwrap();
//! let class = classify(&facts);
//! assert_eq!(class, DeviceClass::Desktop);
//! assert_eq!(level_for(class), OptimizationLevel::Standard);
//! ```
//!
//! ## Monitoring
//!
//! ```no_run
//! use tierscale::monitor::PerformanceMonitor;
//! use std::time::Duration;
//!
//! let monitor = PerformanceMonitor::new();
//! monitor.start(Duration::from_secs(5), Duration::from_secs(1)).unwrap();
//!
//! std::thread::sleep(Duration::from_secs(7));
//! for (name, value) in monitor.current_metrics() {
//!     println!("{name}: {value:.1}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod monitor;
pub mod progress;
pub mod system;

// Re-export commonly used types
pub use config::EngineConfig;
pub use core::{AffinityScheduler, EngineContext, TaskHandle};
pub use error::{Result, TierScaleError};
pub use system::{classify, level_for, DeviceClass, HardwareFacts, OptimizationLevel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use tierscale::prelude::*;
    //! ```

    pub use crate::config::{EngineConfig, QueuePolicy};
    pub use crate::core::{
        run_diagnostics, AffinityScheduler, CancellationToken, EngineContext, SchedulerConfig,
        TaskHandle,
    };
    pub use crate::error::{Result, TierScaleError};
    pub use crate::monitor::{PerformanceMonitor, PerformanceSample, ResourceSampler};
    pub use crate::progress::MetricsReporter;
    pub use crate::system::{
        classify, level_for, strategy_for, DeviceClass, Dimension, HardwareFacts, HardwareProbe,
        OptimizationLevel, StaticProbe, SystemProbe,
    };
}
