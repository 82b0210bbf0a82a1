//! Live metrics display
//!
//! Renders the latest performance sample as two gauges (CPU and memory)
//! under a status spinner. Falls back to one printed line per sample when
//! stderr is not a terminal.

use crate::monitor::{PerformanceMonitor, PerformanceSample};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Gauge resolution: percentages are shown in tenths
const GAUGE_SCALE: f64 = 10.0;

fn gauge_style(color: &str) -> ProgressStyle {
    let template = format!(
        "{{prefix:.bold.dim}} [{{bar:40.{}/white}}] {{msg}}",
        color
    );
    ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn gauge(multi: &MultiProgress, prefix: &'static str, color: &str) -> ProgressBar {
    let bar = multi.add(ProgressBar::new((100.0 * GAUGE_SCALE) as u64));
    bar.set_style(gauge_style(color));
    bar.set_prefix(prefix);
    bar
}

fn to_position(percent: f64) -> u64 {
    (percent.clamp(0.0, 100.0) * GAUGE_SCALE).round() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Bars,
    Lines,
    Hidden,
}

/// Displays performance samples as they arrive
pub struct MetricsReporter {
    multi: MultiProgress,
    status: ProgressBar,
    cpu_bar: ProgressBar,
    memory_bar: ProgressBar,
    mode: Mode,
    start_time: Instant,
    /// Timestamp of the last sample shown
    last_shown: AtomicU64,
    updates: AtomicU64,
    finished: AtomicBool,
}

impl MetricsReporter {
    /// Bars on a terminal, plain lines otherwise
    pub fn new() -> Self {
        if std::io::stderr().is_terminal() {
            Self::with_mode(Mode::Bars)
        } else {
            Self::with_mode(Mode::Lines)
        }
    }

    /// Tracks samples without drawing anything (quiet mode)
    pub fn disabled() -> Self {
        Self::with_mode(Mode::Hidden)
    }

    fn with_mode(mode: Mode) -> Self {
        let multi = MultiProgress::new();
        if mode != Mode::Bars {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status.set_message("Waiting for first sample...");

        let cpu_bar = gauge(&multi, "CPU   ", "cyan");
        let memory_bar = gauge(&multi, "Memory", "green");

        Self {
            multi,
            status,
            cpu_bar,
            memory_bar,
            mode,
            start_time: Instant::now(),
            last_shown: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// Show `sample`. Returns false when it was already shown.
    pub fn update(&self, sample: &PerformanceSample) -> bool {
        let previous = self.last_shown.swap(sample.sampled_at_millis, Ordering::Relaxed);
        if previous == sample.sampled_at_millis && self.updates.load(Ordering::Relaxed) > 0 {
            return false;
        }
        self.updates.fetch_add(1, Ordering::Relaxed);

        let estimated = if sample.estimated { " (estimated)" } else { "" };
        match self.mode {
            Mode::Bars => {
                self.cpu_bar.set_position(to_position(sample.cpu_load_percent));
                self.cpu_bar
                    .set_message(format!("{:5.1}%{}", sample.cpu_load_percent, estimated));
                self.memory_bar
                    .set_position(to_position(sample.memory_usage_percent));
                self.memory_bar
                    .set_message(format!("{:5.1}%", sample.memory_usage_percent));
                self.status.set_message(format!("Sampled at {}", format_timestamp(sample)));
                self.status.tick();
            }
            Mode::Lines => {
                println!(
                    "[{}] cpu {:5.1}%{}  memory {:5.1}%",
                    format_timestamp(sample),
                    sample.cpu_load_percent,
                    estimated,
                    sample.memory_usage_percent
                );
            }
            Mode::Hidden => {}
        }
        true
    }

    /// Print a line above the gauges without tearing them
    pub fn println(&self, msg: &str) {
        match self.mode {
            Mode::Bars => {
                if self.multi.println(msg).is_err() {
                    eprintln!("{}", msg);
                }
            }
            Mode::Lines => println!("{}", msg),
            Mode::Hidden => {}
        }
    }

    /// Poll `monitor` every `refresh` and show new samples until
    /// `duration` elapses (forever when `None`) or the monitor stops.
    pub fn watch(&self, monitor: &PerformanceMonitor, refresh: Duration, duration: Option<Duration>) {
        let refresh = refresh.max(Duration::from_millis(10));
        let deadline = duration.map(|d| Instant::now() + d);

        loop {
            if let Some(sample) = monitor.latest_sample() {
                self.update(&sample);
            }
            if !monitor.is_running() {
                break;
            }

            let sleep_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    refresh.min(deadline - now)
                }
                None => refresh,
            };
            std::thread::sleep(sleep_for);
        }
    }

    /// Samples shown so far
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Time since the reporter was created
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Stop drawing and leave a final status line
    pub fn finish(&self, message: &str) {
        if self.finished.swap(true, Ordering::Relaxed) {
            return;
        }
        self.status.finish_with_message(format!(
            "✓ {} ({} samples in {:.1?})",
            message,
            self.updates(),
            self.elapsed()
        ));
        self.cpu_bar.finish();
        self.memory_bar.finish();
    }
}

impl Default for MetricsReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn format_timestamp(sample: &PerformanceSample) -> String {
    i64::try_from(sample.sampled_at_millis)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| sample.sampled_at_millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::monitor::ResourceSampler;

    fn sample(at: u64, cpu: f64) -> PerformanceSample {
        PerformanceSample {
            cpu_load_percent: cpu,
            memory_usage_percent: 40.0,
            sampled_at_millis: at,
            estimated: false,
        }
    }

    struct FixedSampler;

    impl ResourceSampler for FixedSampler {
        fn cpu_load_percent(&mut self) -> Result<f64> {
            Ok(12.5)
        }

        fn estimated_cpu_load_percent(&mut self) -> f64 {
            0.0
        }

        fn memory_usage_percent(&mut self) -> f64 {
            50.0
        }
    }

    #[test]
    fn test_update_skips_repeated_sample() {
        let reporter = MetricsReporter::disabled();
        assert!(reporter.update(&sample(1_000, 10.0)));
        assert!(!reporter.update(&sample(1_000, 10.0)));
        assert!(reporter.update(&sample(2_000, 20.0)));
        assert_eq!(reporter.updates(), 2);
    }

    #[test]
    fn test_gauge_position_is_clamped() {
        assert_eq!(to_position(-5.0), 0);
        assert_eq!(to_position(42.34), 423);
        assert_eq!(to_position(250.0), 1000);
    }

    #[test]
    fn test_watch_stops_after_duration() {
        let monitor = PerformanceMonitor::with_sampler(Box::new(FixedSampler));
        monitor.start_millis(10, 0).unwrap();

        let reporter = MetricsReporter::disabled();
        reporter.watch(&monitor, Duration::from_millis(10), Some(Duration::from_millis(200)));
        monitor.shutdown();

        assert!(reporter.updates() >= 1);
        assert!(reporter.elapsed() >= Duration::from_millis(200));
        reporter.finish("done");
    }

    #[test]
    fn test_watch_returns_when_monitor_stopped() {
        let monitor = PerformanceMonitor::with_sampler(Box::new(FixedSampler));
        let reporter = MetricsReporter::disabled();
        reporter.watch(&monitor, Duration::from_millis(10), None);
        assert_eq!(reporter.updates(), 0);
    }
}
