//! Resource samplers
//!
//! A sampler reads raw utilization figures from the platform. The monitor
//! owns exactly one sampler and calls it from its background thread.

use crate::error::{Result, TierScaleError};
use sysinfo::System;

/// Source of CPU and memory utilization readings
pub trait ResourceSampler: Send {
    /// Current CPU load in percent.
    ///
    /// Returns `MetricsUnavailable` when the platform cannot report it.
    fn cpu_load_percent(&mut self) -> Result<f64>;

    /// Best-effort CPU load used when `cpu_load_percent` is unavailable
    fn estimated_cpu_load_percent(&mut self) -> f64;

    /// Current memory usage in percent
    fn memory_usage_percent(&mut self) -> f64;
}

/// Sampler backed by `sysinfo`
pub struct SysinfoSampler {
    sys: System,
    cores: usize,
}

impl SysinfoSampler {
    /// Create a sampler and prime the CPU counters.
    ///
    /// CPU usage is computed between two refreshes, so the first reading
    /// after creation covers the interval since this call.
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        Self {
            sys,
            cores: num_cpus::get().max(1),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn cpu_load_percent(&mut self) -> Result<f64> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(TierScaleError::MetricsUnavailable(format!(
                "CPU load is not supported on {}",
                std::env::consts::OS
            )));
        }

        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(TierScaleError::MetricsUnavailable(
                "no CPUs reported by the platform".to_string(),
            ));
        }

        Ok(f64::from(self.sys.global_cpu_usage()))
    }

    fn estimated_cpu_load_percent(&mut self) -> f64 {
        load_average_estimate(System::load_average().one, self.cores)
    }

    fn memory_usage_percent(&mut self) -> f64 {
        self.sys.refresh_memory();
        usage_percent(self.sys.used_memory(), self.sys.total_memory())
    }
}

/// Turn a one-minute load average into a utilization percentage
pub fn load_average_estimate(load_one: f64, cores: usize) -> f64 {
    if !load_one.is_finite() || load_one <= 0.0 {
        return 0.0;
    }
    clamp_percent(load_one / cores.max(1) as f64 * 100.0)
}

/// `used / total` as a percentage, zero when total is unknown
pub fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        clamp_percent(used as f64 / total as f64 * 100.0)
    }
}

/// Clamp into `[0, 100]`, mapping NaN to zero
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
