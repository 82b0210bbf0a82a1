//! Background performance sampling
//!
//! A single thread samples CPU load and memory usage on a fixed interval
//! and publishes each sample as a whole into a shared slot. Readers copy
//! the latest sample out; they never see half of one tick and half of
//! another.

use super::sampler::{clamp_percent, ResourceSampler, SysinfoSampler};
use crate::error::{Result, TierScaleError};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Metric name for CPU load
pub const METRIC_CPU_LOAD: &str = "cpu_load_percent";
/// Metric name for memory usage
pub const METRIC_MEMORY_USAGE: &str = "memory_usage_percent";
/// Metric name for the sample timestamp
pub const METRIC_SAMPLED_AT: &str = "sampled_at_millis";
/// Metric name for the degraded-mode flag (1.0 when the CPU figure is estimated)
pub const METRIC_CPU_ESTIMATED: &str = "cpu_load_estimated";

/// One tick of the sampling loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// CPU load, 0..=100
    pub cpu_load_percent: f64,
    /// Memory usage, 0..=100
    pub memory_usage_percent: f64,
    /// Wall-clock time of the sample, ms since the Unix epoch
    pub sampled_at_millis: u64,
    /// The CPU figure came from the fallback estimate
    pub estimated: bool,
}

impl PerformanceSample {
    /// Flatten into the metric-name keyed map
    pub fn to_metrics(&self) -> HashMap<String, f64> {
        HashMap::from([
            (METRIC_CPU_LOAD.to_string(), self.cpu_load_percent),
            (METRIC_MEMORY_USAGE.to_string(), self.memory_usage_percent),
            (METRIC_SAMPLED_AT.to_string(), self.sampled_at_millis as f64),
            (METRIC_CPU_ESTIMATED.to_string(), if self.estimated { 1.0 } else { 0.0 }),
        ])
    }
}

struct MonitorWorker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Samples system utilization in the background
pub struct PerformanceMonitor {
    latest: Arc<RwLock<Option<PerformanceSample>>>,
    samples_taken: Arc<AtomicU64>,
    degraded: Arc<AtomicBool>,
    sampler: Mutex<Option<Box<dyn ResourceSampler>>>,
    worker: Mutex<Option<MonitorWorker>>,
    started: AtomicBool,
}

impl PerformanceMonitor {
    /// Create a monitor backed by `sysinfo`
    pub fn new() -> Self {
        Self::with_sampler(Box::new(SysinfoSampler::new()))
    }

    /// Create a monitor with a custom sampler
    pub fn with_sampler(sampler: Box<dyn ResourceSampler>) -> Self {
        Self {
            latest: Arc::new(RwLock::new(None)),
            samples_taken: Arc::new(AtomicU64::new(0)),
            degraded: Arc::new(AtomicBool::new(false)),
            sampler: Mutex::new(Some(sampler)),
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Start sampling: first sample after `initial_delay`, then every
    /// `interval`. A monitor can be started once.
    pub fn start(&self, interval: Duration, initial_delay: Duration) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TierScaleError::MonitorAlreadyStarted);
        }
        let sampler = self
            .sampler
            .lock()
            .take()
            .ok_or(TierScaleError::MonitorAlreadyStarted)?;

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let latest = Arc::clone(&self.latest);
        let samples_taken = Arc::clone(&self.samples_taken);
        let degraded = Arc::clone(&self.degraded);
        let interval = interval.max(Duration::from_millis(1));

        // The sampling thread logs through the caller's subscriber.
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        let handle = thread::Builder::new()
            .name("tierscale-monitor".to_string())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    sampling_loop(
                        sampler,
                        stop_rx,
                        interval,
                        initial_delay,
                        SharedSlot {
                            latest,
                            samples_taken,
                            degraded,
                        },
                    )
                })
            })
            .map_err(|e| TierScaleError::ThreadPoolError(format!("failed to spawn monitor: {}", e)))?;

        *self.worker.lock() = Some(MonitorWorker {
            stop: stop_tx,
            handle,
        });

        tracing::info!(
            interval = %humantime::format_duration(interval),
            initial_delay = %humantime::format_duration(initial_delay),
            "Performance monitor started"
        );
        Ok(())
    }

    /// `start` with millisecond arguments
    pub fn start_millis(&self, interval_millis: u64, initial_delay_millis: u64) -> Result<()> {
        self.start(
            Duration::from_millis(interval_millis),
            Duration::from_millis(initial_delay_millis),
        )
    }

    /// Copy of the latest metrics, empty before the first sample
    pub fn current_metrics(&self) -> HashMap<String, f64> {
        self.latest
            .read()
            .as_ref()
            .map(PerformanceSample::to_metrics)
            .unwrap_or_default()
    }

    /// Latest sample, if any
    pub fn latest_sample(&self) -> Option<PerformanceSample> {
        *self.latest.read()
    }

    /// Number of samples published so far
    pub fn samples_taken(&self) -> u64 {
        self.samples_taken.load(Ordering::Relaxed)
    }

    /// Has the monitor fallen back to estimated CPU load?
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Is the sampling thread alive?
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop the sampling thread and wait for it to exit
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        drop(worker.stop);
        if worker.handle.join().is_err() {
            tracing::error!("Performance monitor thread panicked");
        }
        tracing::info!(samples = self.samples_taken(), "Performance monitor stopped");
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("running", &self.is_running())
            .field("samples_taken", &self.samples_taken())
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

struct SharedSlot {
    latest: Arc<RwLock<Option<PerformanceSample>>>,
    samples_taken: Arc<AtomicU64>,
    degraded: Arc<AtomicBool>,
}

fn sampling_loop(
    mut sampler: Box<dyn ResourceSampler>,
    stop: Receiver<()>,
    interval: Duration,
    initial_delay: Duration,
    slot: SharedSlot,
) {
    let mut wait = initial_delay;

    loop {
        // Any message or a dropped sender means stop.
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let sample = take_sample(sampler.as_mut(), &slot.degraded);
        *slot.latest.write() = Some(sample);
        slot.samples_taken.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            cpu = sample.cpu_load_percent,
            memory = sample.memory_usage_percent,
            estimated = sample.estimated,
            "Performance sample"
        );
        wait = interval;
    }

    tracing::debug!("Performance monitor loop exiting");
}

fn take_sample(sampler: &mut dyn ResourceSampler, degraded: &AtomicBool) -> PerformanceSample {
    let (cpu, estimated) = match sampler.cpu_load_percent() {
        Ok(load) => (load, false),
        Err(err) => {
            if !degraded.swap(true, Ordering::Relaxed) {
                tracing::warn!(error = %err, "CPU load unavailable, falling back to load-average estimate");
            }
            (sampler.estimated_cpu_load_percent(), true)
        }
    };

    PerformanceSample {
        cpu_load_percent: clamp_percent(cpu),
        memory_usage_percent: clamp_percent(sampler.memory_usage_percent()),
        sampled_at_millis: now_millis(),
        estimated,
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Sampler returning fixed figures, or a rising counter when `ramp` is set
    struct ScriptedSampler {
        cpu: Option<f64>,
        memory: f64,
        estimate: f64,
        ramp: bool,
        tick: f64,
        estimate_calls: Arc<AtomicUsize>,
    }

    impl ScriptedSampler {
        fn fixed(cpu: Option<f64>, memory: f64) -> Self {
            Self {
                cpu,
                memory,
                estimate: 12.5,
                ramp: false,
                tick: 0.0,
                estimate_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ResourceSampler for ScriptedSampler {
        fn cpu_load_percent(&mut self) -> Result<f64> {
            if self.ramp {
                self.tick = (self.tick + 1.0) % 100.0;
                return Ok(self.tick);
            }
            self.cpu
                .ok_or_else(|| TierScaleError::MetricsUnavailable("scripted".to_string()))
        }

        fn estimated_cpu_load_percent(&mut self) -> f64 {
            self.estimate_calls.fetch_add(1, Ordering::SeqCst);
            self.estimate
        }

        fn memory_usage_percent(&mut self) -> f64 {
            if self.ramp {
                // Same tick as the CPU reading of this sample.
                return self.tick;
            }
            self.memory
        }
    }

    fn wait_for_samples(monitor: &PerformanceMonitor, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.samples_taken() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_metrics_fresh_after_delay_plus_interval() {
        let monitor = PerformanceMonitor::new();
        monitor.start_millis(20, 10).unwrap();

        thread::sleep(Duration::from_millis(10 + 20 + 50));
        let metrics = monitor.current_metrics();
        assert!(!metrics.is_empty());
        assert!(metrics.contains_key(METRIC_CPU_LOAD));
        assert!(metrics.contains_key(METRIC_MEMORY_USAGE));
        assert!(metrics[METRIC_SAMPLED_AT] > 0.0);

        monitor.shutdown();
    }

    #[test]
    fn test_empty_before_first_sample_and_prompt_shutdown() {
        let monitor = PerformanceMonitor::with_sampler(Box::new(ScriptedSampler::fixed(Some(10.0), 20.0)));
        monitor.start(Duration::from_secs(60), Duration::from_secs(60)).unwrap();
        assert!(monitor.current_metrics().is_empty());
        assert!(monitor.latest_sample().is_none());

        let started = Instant::now();
        monitor.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_degraded_mode_uses_estimate() {
        let sampler = ScriptedSampler::fixed(None, 40.0);
        let estimate_calls = Arc::clone(&sampler.estimate_calls);
        let monitor = PerformanceMonitor::with_sampler(Box::new(sampler));
        monitor.start_millis(5, 0).unwrap();
        wait_for_samples(&monitor, 3);
        monitor.shutdown();

        assert!(monitor.is_degraded());
        assert!(estimate_calls.load(Ordering::SeqCst) >= 3);

        let sample = monitor.latest_sample().unwrap();
        assert!(sample.estimated);
        assert_eq!(sample.cpu_load_percent, 12.5);
        assert_eq!(monitor.current_metrics()[METRIC_CPU_ESTIMATED], 1.0);
    }

    /// Counts WARN events seen by the subscriber it is layered into
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_degraded_warning_logged_once() {
        use tracing_subscriber::layer::SubscriberExt;

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        let monitor = PerformanceMonitor::with_sampler(Box::new(ScriptedSampler::fixed(None, 40.0)));
        tracing::subscriber::with_default(subscriber, || {
            monitor.start_millis(5, 0).unwrap();
            wait_for_samples(&monitor, 4);
            monitor.shutdown();
        });

        assert!(monitor.samples_taken() >= 4);
        assert!(monitor.is_degraded());
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_values_are_clamped() {
        let monitor = PerformanceMonitor::with_sampler(Box::new(ScriptedSampler::fixed(Some(150.0), -5.0)));
        monitor.start_millis(5, 0).unwrap();
        wait_for_samples(&monitor, 1);
        monitor.shutdown();

        let sample = monitor.latest_sample().unwrap();
        assert_eq!(sample.cpu_load_percent, 100.0);
        assert_eq!(sample.memory_usage_percent, 0.0);
        assert!(!sample.estimated);
        assert!(!monitor.is_degraded());
    }

    #[test]
    fn test_start_twice_fails() {
        let monitor = PerformanceMonitor::with_sampler(Box::new(ScriptedSampler::fixed(Some(1.0), 1.0)));
        monitor.start_millis(1000, 1000).unwrap();
        assert!(matches!(
            monitor.start_millis(1000, 1000),
            Err(TierScaleError::MonitorAlreadyStarted)
        ));
        monitor.shutdown();
    }

    #[test]
    fn test_no_samples_after_shutdown() {
        let monitor = PerformanceMonitor::with_sampler(Box::new(ScriptedSampler::fixed(Some(1.0), 1.0)));
        monitor.start_millis(2, 0).unwrap();
        wait_for_samples(&monitor, 2);
        monitor.shutdown();

        let taken = monitor.samples_taken();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(monitor.samples_taken(), taken);
    }

    #[test]
    fn test_readers_see_whole_samples() {
        let sampler = ScriptedSampler {
            ramp: true,
            ..ScriptedSampler::fixed(Some(0.0), 0.0)
        };
        let monitor = Arc::new(PerformanceMonitor::with_sampler(Box::new(sampler)));
        monitor.start_millis(1, 0).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let metrics = monitor.current_metrics();
                        if let (Some(cpu), Some(mem)) =
                            (metrics.get(METRIC_CPU_LOAD), metrics.get(METRIC_MEMORY_USAGE))
                        {
                            assert_eq!(cpu, mem);
                        }
                    }
                })
            })
            .collect();

        for reader in readers {
            reader.join().unwrap();
        }
        monitor.shutdown();
    }

    #[test]
    fn test_sample_to_metrics() {
        let sample = PerformanceSample {
            cpu_load_percent: 33.0,
            memory_usage_percent: 66.0,
            sampled_at_millis: 1_700_000_000_000,
            estimated: false,
        };
        let metrics = sample.to_metrics();
        assert_eq!(metrics.len(), 4);
        assert_eq!(metrics[METRIC_CPU_LOAD], 33.0);
        assert_eq!(metrics[METRIC_CPU_ESTIMATED], 0.0);
    }
}
