//! Self-test run by `tierscale diagnose`
//!
//! Each component is exercised against its documented behavior and
//! reported as PASS or FAIL with a short detail line.

use super::context::EngineContext;
use crate::error::TierScaleError;
use crate::monitor::{PerformanceMonitor, METRIC_CPU_LOAD, METRIC_MEMORY_USAGE, METRIC_SAMPLED_AT};
use crate::system::{
    classify, level_for, strategy_for, DeviceClass, Dimension, HardwareFacts, OptimizationLevel,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Sampling cadence of the throwaway monitor used by the freshness check
const SAMPLE_INTERVAL: Duration = Duration::from_millis(50);
const SAMPLE_DELAY: Duration = Duration::from_millis(20);
const SAMPLE_DEADLINE: Duration = Duration::from_secs(3);

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// Behaved as documented
    Pass,
    /// Deviated; see the detail line
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => f.write_str("PASS"),
            CheckStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// One component check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Component under test
    pub component: &'static str,
    /// PASS or FAIL
    pub status: CheckStatus,
    /// What was observed
    pub detail: String,
    /// Time spent in the check
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

/// All checks of one diagnostics run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticReport {
    /// Checks in the order they ran
    pub checks: Vec<CheckResult>,
}

impl DiagnosticReport {
    /// Did every check pass?
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Pass)
    }

    /// Checks that failed
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    /// Print one line per check
    pub fn print(&self) {
        println!("=== TierScale Diagnostics ===\n");
        for check in &self.checks {
            println!(
                "[{}] {:<28} {:>8.2?}  {}",
                check.status, check.component, check.elapsed, check.detail
            );
        }
        let failed = self.failures().count();
        println!();
        if failed == 0 {
            println!("All {} checks passed.", self.checks.len());
        } else {
            println!("{} of {} checks failed.", failed, self.checks.len());
        }
    }
}

/// Run every check against a bootstrapped engine
pub fn run_diagnostics(ctx: &EngineContext) -> DiagnosticReport {
    let checks = vec![
        run_check("DeviceClassifier", || check_classifier(ctx)),
        run_check("OptimizationPolicy", check_policy),
        run_check("ResourceStrategySelector", check_strategies),
        run_check("AffinityScheduler", || check_scheduler(ctx)),
        run_check("PerformanceMonitor", check_monitor),
    ];
    DiagnosticReport { checks }
}

fn run_check<F>(component: &'static str, check: F) -> CheckResult
where
    F: FnOnce() -> std::result::Result<String, String>,
{
    let start = Instant::now();
    let (status, detail) = match check() {
        Ok(detail) => (CheckStatus::Pass, detail),
        Err(detail) => (CheckStatus::Fail, detail),
    };
    let elapsed = start.elapsed();

    match status {
        CheckStatus::Pass => tracing::info!(component, %detail, "Check passed"),
        CheckStatus::Fail => tracing::error!(component, %detail, "Check failed"),
    }

    CheckResult {
        component,
        status,
        detail,
        elapsed,
    }
}

fn facts(cores: u32, memory_bytes: u64) -> HardwareFacts {
    HardwareFacts {
        core_count: cores,
        memory_bytes,
        platform_name: "diagnostics".to_string(),
    }
}

fn expect_class(cores: u32, memory: u64, expected: DeviceClass) -> std::result::Result<(), String> {
    let got = classify(&facts(cores, memory));
    if got == expected {
        Ok(())
    } else {
        Err(format!("{{{}, {}}} classified as {}, expected {}", cores, memory, got, expected))
    }
}

fn check_classifier(ctx: &EngineContext) -> std::result::Result<String, String> {
    expect_class(4, 10 * GIB, DeviceClass::Desktop)?;
    expect_class(1, 512, DeviceClass::Calculator)?;
    let big = classify(&facts(64, 128 * GIB));
    if big < DeviceClass::Cluster {
        return Err(format!("{{64, 128 GiB}} classified as {}, expected >= Cluster", big));
    }

    for pair in DeviceClass::ALL.windows(2) {
        let (lo, hi) = (pair[0].thresholds(), pair[1].thresholds());
        if hi.min_memory_bytes <= lo.min_memory_bytes || hi.min_cores < lo.min_cores {
            return Err(format!("thresholds of {} do not dominate {}", pair[1], pair[0]));
        }
    }

    let cores = [1u32, 2, 3, 4, 8, 12, 16, 64, 256, 1024];
    let memory = [0u64, 512, 64 * MIB, GIB, 4 * GIB, 16 * GIB, 32 * GIB, 128 * GIB, 1024 * GIB];
    for (ci, &c) in cores.iter().enumerate() {
        for (mi, &m) in memory.iter().enumerate() {
            let here = classify(&facts(c, m));
            if let Some(&more_cores) = cores.get(ci + 1) {
                if classify(&facts(more_cores, m)) < here {
                    return Err(format!("adding cores to {{{}, {}}} lowered its tier", c, m));
                }
            }
            if let Some(&more_memory) = memory.get(mi + 1) {
                if classify(&facts(c, more_memory)) < here {
                    return Err(format!("adding memory to {{{}, {}}} lowered its tier", c, m));
                }
            }
        }
    }

    let again = classify(ctx.facts());
    if again != ctx.device_class() {
        return Err(format!(
            "reclassifying this machine gave {}, bootstrap gave {}",
            again,
            ctx.device_class()
        ));
    }

    Ok(format!(
        "scenarios and monotonicity grid ok; this machine is {}",
        ctx.device_class()
    ))
}

fn check_policy() -> std::result::Result<String, String> {
    let expected = [
        (DeviceClass::Desktop, OptimizationLevel::Standard),
        (DeviceClass::Calculator, OptimizationLevel::Minimal),
        (DeviceClass::Cluster, OptimizationLevel::Extreme),
    ];
    for (class, level) in expected {
        let got = level_for(class);
        if got != level {
            return Err(format!("{} maps to {}, expected {}", class, got, level));
        }
    }

    let mut seen = HashSet::new();
    for class in DeviceClass::ALL {
        let level = level_for(class);
        if level_for(class) != level {
            return Err(format!("{} maps inconsistently", class));
        }
        seen.insert(level);
    }
    if seen.len() != OptimizationLevel::ALL.len() {
        return Err(format!(
            "only {} of {} levels are reachable",
            seen.len(),
            OptimizationLevel::ALL.len()
        ));
    }

    Ok(format!("{} tiers cover all {} levels", DeviceClass::ALL.len(), seen.len()))
}

fn check_strategies() -> std::result::Result<String, String> {
    let mut pairs = 0;
    for class in DeviceClass::ALL {
        for dim in Dimension::ALL {
            if strategy_for(class, dim).is_empty() {
                return Err(format!("no {} strategy for {}", dim, class));
            }
            pairs += 1;
        }
    }
    Ok(format!("{} tier/dimension pairs resolved", pairs))
}

fn check_scheduler(ctx: &EngineContext) -> std::result::Result<String, String> {
    let scheduler = ctx.scheduler();
    if scheduler.is_closed() {
        return Err("scheduler is shut down".to_string());
    }

    let submit = |name: &str, fail: bool| {
        scheduler
            .submit(name, move || {
                if fail {
                    anyhow::bail!("injected failure");
                }
                Ok(())
            })
            .map_err(|e| format!("submit {} failed: {}", name, e))
    };

    let first = submit("diag-task-1", false)?;
    let second = submit("diag-task-2", true)?;
    let third = submit("diag-task-3", false)?;

    first.wait().map_err(|e| format!("diag-task-1 should succeed: {}", e))?;
    match second.wait() {
        Err(TierScaleError::TaskFailed { name, .. }) if name == "diag-task-2" => {}
        Err(e) => return Err(format!("diag-task-2 failed with the wrong error: {}", e)),
        Ok(()) => return Err("diag-task-2 should have failed".to_string()),
    }
    third.wait().map_err(|e| format!("diag-task-3 should succeed: {}", e))?;

    let workers = scheduler.workers();
    if workers == 0 {
        return Err("scheduler has no workers".to_string());
    }
    let peak = scheduler.stats().snapshot().peak_in_progress;
    if peak > workers {
        return Err(format!("{} tasks ran at once on {} workers", peak, workers));
    }

    Ok(format!(
        "failure isolated to its task; {} workers, peak {} running",
        workers, peak
    ))
}

fn check_monitor() -> std::result::Result<String, String> {
    let monitor = PerformanceMonitor::new();
    monitor
        .start(SAMPLE_INTERVAL, SAMPLE_DELAY)
        .map_err(|e| format!("monitor failed to start: {}", e))?;

    let start = Instant::now();
    let metrics = loop {
        let metrics = monitor.current_metrics();
        if !metrics.is_empty() {
            break metrics;
        }
        if start.elapsed() > SAMPLE_DEADLINE {
            monitor.shutdown();
            return Err(format!(
                "no metrics within {}",
                humantime::format_duration(SAMPLE_DEADLINE)
            ));
        }
        std::thread::sleep(SAMPLE_INTERVAL / 2);
    };
    let degraded = monitor.is_degraded();
    monitor.shutdown();

    for key in [METRIC_CPU_LOAD, METRIC_MEMORY_USAGE] {
        match metrics.get(key) {
            Some(v) if (0.0..=100.0).contains(v) => {}
            Some(v) => return Err(format!("{} out of range: {}", key, v)),
            None => return Err(format!("{} missing", key)),
        }
    }
    if !metrics.contains_key(METRIC_SAMPLED_AT) {
        return Err(format!("{} missing", METRIC_SAMPLED_AT));
    }

    Ok(format!(
        "fresh metrics after {:.0?}{}",
        start.elapsed(),
        if degraded { " (cpu estimated)" } else { "" }
    ))
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, MonitorSettings};
    use crate::system::StaticProbe;

    fn context() -> EngineContext {
        let config = EngineConfig {
            monitor: MonitorSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let probe = StaticProbe::new(HardwareFacts::new(4, 10 * GIB, "test").unwrap());
        EngineContext::bootstrap(&config, &probe).unwrap()
    }

    #[test]
    fn test_all_checks_pass() {
        let ctx = context();
        let report = run_diagnostics(&ctx);
        for check in &report.checks {
            assert_eq!(check.status, CheckStatus::Pass, "{}: {}", check.component, check.detail);
        }
        assert!(report.all_passed());
        assert_eq!(report.checks.len(), 5);
    }

    #[test]
    fn test_closed_scheduler_fails() {
        let ctx = context();
        ctx.shutdown();
        let result = run_check("AffinityScheduler", || check_scheduler(&ctx));
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.detail.contains("shut down"));
    }

    #[test]
    fn test_scheduler_check_reports_sizing() {
        let config = EngineConfig {
            monitor: MonitorSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let probe = StaticProbe::new(HardwareFacts::new(1, 512, "test").unwrap());
        let ctx = EngineContext::bootstrap(&config, &probe).unwrap();

        let result = run_check("AffinityScheduler", || check_scheduler(&ctx));
        assert_eq!(result.status, CheckStatus::Pass, "{}", result.detail);
        assert!(result.detail.contains("1 workers, peak 1 running"), "{}", result.detail);
        assert!(ctx.scheduler().stats().snapshot().peak_in_progress <= ctx.scheduler().workers());
    }

    #[test]
    fn test_report_aggregation() {
        let report = DiagnosticReport {
            checks: vec![
                run_check("ok", || Ok("fine".to_string())),
                run_check("bad", || Err("broken".to_string())),
            ],
        };
        assert!(!report.all_passed());
        let failed: Vec<_> = report.failures().map(|c| c.component).collect();
        assert_eq!(failed, vec!["bad"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["checks"][1]["status"], "FAIL");
    }
}
