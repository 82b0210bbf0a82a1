//! Configuration settings for TierScale
//!
//! Defines the CLI arguments, the JSON engine configuration file and the
//! defaults used when neither says otherwise.

use crate::core::{MAX_QUEUE_CAPACITY, MAX_WORKERS};
use crate::error::{IoResultExt, Result, TierScaleError};
use crate::system::HardwareFacts;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TierScale - hardware tier classification and affinity-sized worker pools
#[derive(Parser, Debug, Clone)]
#[command(name = "tierscale")]
#[command(author = "TierScale Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Classify hardware, derive an optimization policy and size a worker pool")]
#[command(long_about = r#"
TierScale inspects basic machine facts (core count, memory size), assigns a
device tier, derives an optimization level and sizes a worker pool from it.

Examples:
  tierscale analyze                          # Classify this machine
  tierscale --cores 4 --memory 10G analyze   # Classify a described machine
  tierscale diagnose                         # PASS/FAIL self-test per component
  tierscale monitor --interval 1s            # Live CPU / memory metrics
"#)]
pub struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE", env = "TIERSCALE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the probed core count (requires --memory)
    #[arg(long, value_name = "NUM", requires = "memory")]
    pub cores: Option<u32>,

    /// Override the probed memory size, e.g. 512M, 10G (requires --cores)
    #[arg(long, value_name = "SIZE", value_parser = parse_size, requires = "cores")]
    pub memory: Option<u64>,

    /// Platform name used with --cores/--memory
    #[arg(long, value_name = "NAME", default_value = "manual")]
    pub platform: String,

    /// Worker thread count (default: one per core)
    #[arg(short = 't', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Task queue capacity (default: derived from the optimization level)
    #[arg(long, value_name = "NUM")]
    pub queue_capacity: Option<usize>,

    /// Behavior when the task queue is full
    #[arg(long, value_enum, value_name = "POLICY")]
    pub queue_policy: Option<QueuePolicy>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors are logged)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to run (default: analyze)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Classify the machine and print the derived policy and strategies
    #[command(name = "analyze")]
    Analyze {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a PASS/FAIL self-test of every component
    #[command(name = "diagnose")]
    Diagnose,

    /// Show live CPU and memory metrics
    #[command(name = "monitor")]
    Monitor {
        /// Sampling interval (e.g. 500ms, 5s)
        #[arg(long, default_value = "5s", value_parser = parse_duration)]
        interval: Duration,
        /// Delay before the first sample
        #[arg(long, default_value = "1s", value_parser = parse_duration)]
        delay: Duration,
        /// Stop after this long (default: run until interrupted)
        #[arg(long, value_parser = parse_duration)]
        duration: Option<Duration>,
    },
}

/// What the scheduler does when its queue is full
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Fail the submission immediately; `submit` never blocks
    #[default]
    Reject,
    /// Wait for a free slot (back-pressure on the submitter)
    Block,
}

/// Scheduler section of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Worker count override
    pub workers: Option<usize>,
    /// Queue capacity override
    pub queue_capacity: Option<usize>,
    /// Full-queue policy
    pub queue_policy: QueuePolicy,
}

/// Monitor section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Start the monitor during bootstrap
    pub enabled: bool,
    /// Sampling interval in milliseconds
    pub interval_ms: u64,
    /// Delay before the first sample in milliseconds
    pub initial_delay_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
            initial_delay_ms: 1000,
        }
    }
}

impl MonitorSettings {
    /// Sampling interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Delay before the first sample
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Engine configuration, loaded from JSON and/or CLI flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed hardware facts; when absent the system is probed
    pub hardware: Option<HardwareFacts>,
    /// Scheduler settings
    pub scheduler: SchedulerSettings,
    /// Monitor settings
    pub monitor: MonitorSettings,
}

impl EngineConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Build from CLI arguments: config file first, flags on top
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        match (args.cores, args.memory) {
            (Some(cores), Some(memory)) => {
                config.hardware = Some(HardwareFacts::new(cores, memory, args.platform.clone())?);
            }
            (None, None) => {}
            _ => {
                return Err(TierScaleError::config(
                    "--cores and --memory must be given together",
                ))
            }
        }

        if args.workers.is_some() {
            config.scheduler.workers = args.workers;
        }
        if args.queue_capacity.is_some() {
            config.scheduler.queue_capacity = args.queue_capacity;
        }
        if let Some(policy) = args.queue_policy {
            config.scheduler.queue_policy = policy;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a working engine
    pub fn validate(&self) -> Result<()> {
        if let Some(facts) = &self.hardware {
            facts.validate()?;
        }
        match self.scheduler.workers {
            Some(0) => return Err(TierScaleError::config("scheduler.workers must be at least 1")),
            Some(n) if n > MAX_WORKERS => {
                return Err(TierScaleError::config(format!(
                    "scheduler.workers must be at most {}",
                    MAX_WORKERS
                )))
            }
            _ => {}
        }
        match self.scheduler.queue_capacity {
            Some(0) => return Err(TierScaleError::config("scheduler.queue_capacity must be at least 1")),
            Some(n) if n > MAX_QUEUE_CAPACITY => {
                return Err(TierScaleError::config(format!(
                    "scheduler.queue_capacity must be at most {}",
                    MAX_QUEUE_CAPACITY
                )))
            }
            _ => {}
        }
        if self.monitor.interval_ms == 0 {
            return Err(TierScaleError::config("monitor.interval_ms must be greater than 0"));
        }
        Ok(())
    }
}

/// Parse human-readable size string to bytes (binary units)
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        (size.trim_end_matches(['T', 'B']), 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else {
        (size.trim_end_matches('B'), 1u64)
    };
    let num_str = num_str.trim();

    if let Ok(whole) = num_str.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Size too large: {}", size));
    }

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Invalid size: {}", size));
    }

    Ok((num * multiplier as f64) as u64)
}

/// Parse a human-readable duration such as `500ms` or `5s`
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value.trim()).map_err(|e| format!("Invalid duration '{}': {}", value, e))
}
