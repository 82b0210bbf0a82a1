//! Hardware facts and probes
//!
//! A `HardwareFacts` snapshot is captured exactly once at startup and never
//! mutated. Everything downstream (classification, policy, pool sizing)
//! reads from that snapshot.

use crate::error::{Result, TierScaleError};
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Minimal snapshot of machine capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFacts {
    /// Number of logical cores as reported by the probe
    pub core_count: u32,
    /// Total physical memory in bytes
    pub memory_bytes: u64,
    /// Human-readable platform / OS name
    pub platform_name: String,
}

impl HardwareFacts {
    /// Create a new snapshot, validating it.
    ///
    /// A zero core count is accepted here and clamped at use sites; only a
    /// missing platform name is rejected.
    pub fn new(core_count: u32, memory_bytes: u64, platform_name: impl Into<String>) -> Result<Self> {
        let facts = Self {
            core_count,
            memory_bytes,
            platform_name: platform_name.into(),
        };
        facts.validate()?;
        Ok(facts)
    }

    /// Check the snapshot is usable for classification
    pub fn validate(&self) -> Result<()> {
        if self.platform_name.trim().is_empty() {
            return Err(TierScaleError::config("hardware facts are missing a platform name"));
        }
        Ok(())
    }

    /// Core count clamped to at least one
    pub fn effective_cores(&self) -> u32 {
        self.core_count.max(1)
    }

    /// Worker count for an affinity-sized pool
    pub fn worker_count(&self) -> usize {
        self.effective_cores() as usize
    }

    /// Print a short summary to console
    pub fn print_summary(&self) {
        println!("=== Hardware Facts ===\n");
        println!("  Platform: {}", self.platform_name);
        println!("  Cores: {}", self.core_count);
        println!(
            "  Memory: {}",
            humansize::format_size(self.memory_bytes, humansize::BINARY)
        );
    }
}

/// Producer of the startup hardware snapshot
pub trait HardwareProbe {
    /// Capture the hardware facts
    fn probe(&self) -> Result<HardwareFacts>;
}

/// Probe backed by the running system (num_cpus + sysinfo)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl SystemProbe {
    /// Create a new system probe
    pub fn new() -> Self {
        Self
    }

    fn platform_name() -> String {
        System::long_os_version()
            .or_else(System::name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH))
    }
}

impl HardwareProbe for SystemProbe {
    fn probe(&self) -> Result<HardwareFacts> {
        let mut sys = System::new();
        sys.refresh_memory();

        let core_count = u32::try_from(num_cpus::get()).unwrap_or(u32::MAX);
        let memory_bytes = sys.total_memory();
        let platform_name = Self::platform_name();

        tracing::debug!(
            cores = core_count,
            memory_bytes,
            platform = %platform_name,
            "Probed hardware"
        );

        HardwareFacts::new(core_count, memory_bytes, platform_name)
    }
}

/// Probe returning a fixed snapshot (config overrides, tests)
#[derive(Debug, Clone)]
pub struct StaticProbe {
    facts: HardwareFacts,
}

impl StaticProbe {
    /// Create a probe that always reports `facts`
    pub fn new(facts: HardwareFacts) -> Self {
        Self { facts }
    }
}

impl HardwareProbe for StaticProbe {
    fn probe(&self) -> Result<HardwareFacts> {
        self.facts.validate()?;
        Ok(self.facts.clone())
    }
}
