//! Engine bootstrap
//!
//! `EngineContext` is built once at startup and handed by reference to
//! whatever needs it. It owns the hardware snapshot, the derived tier and
//! level, the worker pool and the performance monitor.

use super::scheduler::{AffinityScheduler, SchedulerConfig, TaskHandle};
use crate::config::{EngineConfig, QueuePolicy};
use crate::error::{Result, TierScaleError};
use crate::monitor::PerformanceMonitor;
use crate::system::{
    classify, level_for, strategy_for, strategy_profile, DeviceClass, Dimension, HardwareFacts,
    HardwareProbe, OptimizationLevel, TierThresholds,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Everything derived at boot, plus the long-running components
pub struct EngineContext {
    facts: HardwareFacts,
    class: DeviceClass,
    level: OptimizationLevel,
    scheduler: AffinityScheduler,
    monitor: PerformanceMonitor,
}

/// Serializable summary of a bootstrapped engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    /// Hardware snapshot
    pub facts: HardwareFacts,
    /// Assigned tier
    pub device_class: DeviceClass,
    /// Thresholds of the assigned tier
    pub thresholds: TierThresholds,
    /// Derived optimization level
    pub optimization_level: OptimizationLevel,
    /// Scheduler worker threads
    pub workers: usize,
    /// Scheduler queue capacity
    pub queue_capacity: usize,
    /// Scheduler full-queue policy
    pub queue_policy: QueuePolicy,
    /// Strategy per dimension
    pub strategies: BTreeMap<String, String>,
}

impl EngineContext {
    /// Probe (unless the config pins the facts), classify, derive the
    /// policy, spawn the scheduler and start the monitor.
    pub fn bootstrap(config: &EngineConfig, probe: &dyn HardwareProbe) -> Result<Self> {
        Self::bootstrap_with_monitor(config, probe, PerformanceMonitor::new())
    }

    /// `bootstrap` with a caller-supplied monitor
    pub fn bootstrap_with_monitor(
        config: &EngineConfig,
        probe: &dyn HardwareProbe,
        monitor: PerformanceMonitor,
    ) -> Result<Self> {
        config.validate()?;

        let facts = match &config.hardware {
            Some(facts) => facts.clone(),
            None => probe.probe()?,
        };

        let class = classify(&facts);
        let level = level_for(class);
        let scheduler = AffinityScheduler::new(scheduler_config(config, &facts, level)?)?;

        if config.monitor.enabled {
            monitor.start(config.monitor.interval(), config.monitor.initial_delay())?;
        }

        tracing::info!(
            platform = %facts.platform_name,
            cores = facts.core_count,
            memory = %humansize::format_size(facts.memory_bytes, humansize::BINARY),
            tier = %class,
            level = %level,
            "Engine bootstrapped"
        );

        Ok(Self {
            facts,
            class,
            level,
            scheduler,
            monitor,
        })
    }

    /// Hardware snapshot captured at boot
    pub fn facts(&self) -> &HardwareFacts {
        &self.facts
    }

    /// Tier assigned at boot
    pub fn device_class(&self) -> DeviceClass {
        self.class
    }

    /// Level derived at boot
    pub fn optimization_level(&self) -> OptimizationLevel {
        self.level
    }

    /// The worker pool
    pub fn scheduler(&self) -> &AffinityScheduler {
        &self.scheduler
    }

    /// The performance monitor
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Strategy for this machine's tier along `dimension`
    pub fn strategy_for(&self, dimension: Dimension) -> &'static str {
        strategy_for(self.class, dimension)
    }

    /// Submit a named task to the worker pool
    pub fn submit<T, F>(&self, name: impl Into<String>, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.scheduler.submit(name, task)
    }

    /// Latest performance metrics
    pub fn current_metrics(&self) -> HashMap<String, f64> {
        self.monitor.current_metrics()
    }

    /// Build a serializable summary
    pub fn report(&self) -> EngineReport {
        let config = self.scheduler.config();
        EngineReport {
            facts: self.facts.clone(),
            device_class: self.class,
            thresholds: self.class.thresholds(),
            optimization_level: self.level,
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            queue_policy: config.queue_policy,
            strategies: strategy_profile(self.class)
                .into_iter()
                .map(|(dim, strategy)| (dim.name().to_string(), strategy.to_string()))
                .collect(),
        }
    }

    /// Print the summary to console
    pub fn print_summary(&self) {
        self.facts.print_summary();

        let thresholds = self.class.thresholds();
        println!("\nClassification:");
        println!("  Tier: {} ({})", self.class, self.class.description());
        println!(
            "  Tier thresholds: >= {} cores, >= {}",
            thresholds.min_cores,
            humansize::format_size(thresholds.min_memory_bytes, humansize::BINARY)
        );
        println!("  Optimization level: {}", self.level);

        let config = self.scheduler.config();
        println!("\nScheduler:");
        println!("  Workers: {}", config.workers);
        println!("  Queue capacity: {}", config.queue_capacity);
        println!("  Full-queue policy: {:?}", config.queue_policy);

        println!("\nStrategies:");
        for (dim, strategy) in strategy_profile(self.class) {
            println!("  {:<12} {}", dim.name(), strategy);
        }
    }

    /// Stop the scheduler (draining queued work) and the monitor
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.monitor.shutdown();
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("facts", &self.facts)
            .field("class", &self.class)
            .field("level", &self.level)
            .field("scheduler", &self.scheduler)
            .field("monitor", &self.monitor)
            .finish()
    }
}

fn scheduler_config(
    config: &EngineConfig,
    facts: &HardwareFacts,
    level: OptimizationLevel,
) -> Result<SchedulerConfig> {
    let mut sched = SchedulerConfig::for_hardware(facts, level).with_policy(config.scheduler.queue_policy);

    if let Some(workers) = config.scheduler.workers {
        let capacity = workers
            .checked_mul(level.queue_depth_per_worker())
            .ok_or_else(|| TierScaleError::config(format!("{} workers overflow the queue size", workers)))?;
        sched = sched.with_workers(workers).with_queue_capacity(capacity);
    }
    if let Some(capacity) = config.scheduler.queue_capacity {
        sched = sched.with_queue_capacity(capacity);
    }
    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorSettings;
    use crate::core::scheduler::{MAX_QUEUE_CAPACITY, MAX_WORKERS};
    use crate::system::StaticProbe;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            monitor: MonitorSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn probe(cores: u32, memory: u64) -> StaticProbe {
        StaticProbe::new(HardwareFacts::new(cores, memory, "test").unwrap())
    }

    #[test]
    fn test_bootstrap_desktop() {
        let ctx = EngineContext::bootstrap(&quiet_config(), &probe(4, 10 * GIB)).unwrap();
        assert_eq!(ctx.device_class(), DeviceClass::Desktop);
        assert_eq!(ctx.optimization_level(), OptimizationLevel::Standard);
        assert_eq!(ctx.scheduler().workers(), 4);
        assert_eq!(ctx.scheduler().config().queue_capacity, 64);
        assert_eq!(ctx.strategy_for(Dimension::Scheduling), "fair-share");
        ctx.shutdown();
    }

    #[test]
    fn test_bootstrap_calculator() {
        let ctx = EngineContext::bootstrap(&quiet_config(), &probe(1, 512)).unwrap();
        assert_eq!(ctx.device_class(), DeviceClass::Calculator);
        assert_eq!(ctx.optimization_level(), OptimizationLevel::Minimal);
        assert_eq!(ctx.scheduler().workers(), 1);
    }

    #[test]
    fn test_config_hardware_overrides_probe() {
        let mut config = quiet_config();
        config.hardware = Some(HardwareFacts::new(64, 128 * GIB, "pinned").unwrap());
        config.scheduler.workers = Some(2);

        let ctx = EngineContext::bootstrap(&config, &probe(1, 0)).unwrap();
        assert!(ctx.device_class() >= DeviceClass::Cluster);
        assert_eq!(ctx.optimization_level(), OptimizationLevel::Extreme);
        assert_eq!(ctx.facts().platform_name, "pinned");
        assert_eq!(ctx.scheduler().workers(), 2);
        assert_eq!(ctx.scheduler().config().queue_capacity, 128);
    }

    #[test]
    fn test_bad_probe_is_fatal() {
        let facts = HardwareFacts {
            core_count: 4,
            memory_bytes: GIB,
            platform_name: String::new(),
        };
        let result = EngineContext::bootstrap(&quiet_config(), &StaticProbe::new(facts));
        assert!(matches!(result, Err(TierScaleError::ConfigError(_))));
    }

    #[test]
    fn test_oversized_sizing_is_an_error() {
        let mut config = quiet_config();
        config.scheduler.workers = Some(usize::MAX / 2);
        let result = EngineContext::bootstrap(&config, &probe(4, 10 * GIB));
        assert!(matches!(result, Err(TierScaleError::ConfigError(_))));

        let mut config = quiet_config();
        config.scheduler.queue_capacity = Some(usize::MAX);
        let result = EngineContext::bootstrap(&config, &probe(4, 10 * GIB));
        assert!(matches!(result, Err(TierScaleError::ConfigError(_))));

        let mut config = quiet_config();
        config.hardware = Some(HardwareFacts::new(4_000_000_000, 2048 * GIB, "huge").unwrap());
        let result = EngineContext::bootstrap(&config, &probe(1, 0));
        assert!(matches!(result, Err(TierScaleError::ThreadPoolError(_))));
    }

    #[test]
    fn test_overflowing_worker_override_is_caught() {
        let mut config = quiet_config();
        config.scheduler.workers = Some(usize::MAX / 2);
        let facts = HardwareFacts::new(4, 10 * GIB, "test").unwrap();
        let result = scheduler_config(&config, &facts, OptimizationLevel::Extreme);
        assert!(matches!(result, Err(TierScaleError::ConfigError(_))));

        let mut config = quiet_config();
        config.scheduler.workers = Some(MAX_WORKERS);
        let sched = scheduler_config(&config, &facts, OptimizationLevel::Extreme).unwrap();
        assert_eq!(sched.queue_capacity, MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_submit_and_shutdown() {
        let ctx = EngineContext::bootstrap(&quiet_config(), &probe(2, 2 * GIB)).unwrap();
        let handle = ctx.submit("sum", || Ok((1..=10).sum::<u32>())).unwrap();
        assert_eq!(handle.wait().unwrap(), 55);

        ctx.shutdown();
        assert!(matches!(ctx.submit("late", || Ok(())), Err(TierScaleError::SchedulerClosed)));
    }

    #[test]
    fn test_monitor_started_when_enabled() {
        let mut config = EngineConfig::default();
        config.monitor.interval_ms = 10;
        config.monitor.initial_delay_ms = 0;

        let ctx = EngineContext::bootstrap(&config, &probe(2, 2 * GIB)).unwrap();
        assert!(ctx.monitor().is_running());
        ctx.shutdown();
        assert!(!ctx.monitor().is_running());
    }

    #[test]
    fn test_report() {
        let ctx = EngineContext::bootstrap(&quiet_config(), &probe(8, 16 * GIB)).unwrap();
        let report = ctx.report();
        assert_eq!(report.device_class, DeviceClass::Workstation);
        assert_eq!(report.optimization_level, OptimizationLevel::Aggressive);
        assert_eq!(report.strategies.len(), Dimension::ALL.len());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["device_class"], "Workstation");
        assert_eq!(json["queue_policy"], "reject");
    }
}
