//! Per-tier resource strategies
//!
//! Lookup tables consumed by peripheral subsystems (memory management,
//! scheduling, display, networking, filesystem). The tables only name a
//! strategy; acting on it is the consumer's business.

use super::DeviceClass;
use crate::error::TierScaleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource dimension a strategy applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Memory allocation
    Memory,
    /// Thread/task scheduling
    Scheduling,
    /// Display output
    Display,
    /// Network stack
    Network,
    /// Filesystem layout and caching
    Filesystem,
}

impl Dimension {
    /// All dimensions
    pub const ALL: [Dimension; 5] = [
        Dimension::Memory,
        Dimension::Scheduling,
        Dimension::Display,
        Dimension::Network,
        Dimension::Filesystem,
    ];

    /// Lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Memory => "memory",
            Dimension::Scheduling => "scheduling",
            Dimension::Display => "display",
            Dimension::Network => "network",
            Dimension::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = TierScaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Dimension::ALL
            .into_iter()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| TierScaleError::config(format!("unknown strategy dimension '{}'", s)))
    }
}

fn memory_strategy(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::Calculator => "static-pool",
        DeviceClass::Embedded => "fixed-block",
        DeviceClass::Mobile => "slab",
        DeviceClass::Desktop => "buddy",
        DeviceClass::Workstation => "buddy-large-pages",
        DeviceClass::Server => "numa-hint-arenas",
        DeviceClass::Cluster => "distributed-arenas",
        DeviceClass::Supercomputer => "partitioned-global",
    }
}

fn scheduling_strategy(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::Calculator => "single-task",
        DeviceClass::Embedded => "cooperative",
        DeviceClass::Mobile => "priority-preemptive",
        DeviceClass::Desktop => "fair-share",
        DeviceClass::Workstation => "multi-level-feedback",
        DeviceClass::Server => "work-stealing",
        DeviceClass::Cluster => "gang",
        DeviceClass::Supercomputer => "batch-partitioned",
    }
}

fn display_strategy(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::Calculator => "segment",
        DeviceClass::Embedded => "text-mode",
        DeviceClass::Mobile => "touch-compositor",
        DeviceClass::Desktop => "windowed-compositor",
        DeviceClass::Workstation => "multi-monitor-accelerated",
        DeviceClass::Server => "headless-console",
        DeviceClass::Cluster => "headless-remote",
        DeviceClass::Supercomputer => "headless-batch",
    }
}

fn network_strategy(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::Calculator => "none",
        DeviceClass::Embedded => "minimal-stack",
        DeviceClass::Mobile => "power-aware",
        DeviceClass::Desktop => "standard-tcp",
        DeviceClass::Workstation => "tuned-tcp",
        DeviceClass::Server => "multi-queue",
        DeviceClass::Cluster => "rdma-ready",
        DeviceClass::Supercomputer => "interconnect-fabric",
    }
}

fn filesystem_strategy(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::Calculator => "ram-only",
        DeviceClass::Embedded => "flash-log",
        DeviceClass::Mobile => "flash-journaled",
        DeviceClass::Desktop => "journaled",
        DeviceClass::Workstation => "journaled-write-back",
        DeviceClass::Server => "copy-on-write",
        DeviceClass::Cluster => "shared-parallel",
        DeviceClass::Supercomputer => "parallel-striped",
    }
}

/// Strategy name for a tier along one dimension
pub fn strategy_for(class: DeviceClass, dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Memory => memory_strategy(class),
        Dimension::Scheduling => scheduling_strategy(class),
        Dimension::Display => display_strategy(class),
        Dimension::Network => network_strategy(class),
        Dimension::Filesystem => filesystem_strategy(class),
    }
}

/// Every strategy for a tier, in `Dimension::ALL` order
pub fn strategy_profile(class: DeviceClass) -> Vec<(Dimension, &'static str)> {
    Dimension::ALL
        .iter()
        .map(|d| (*d, strategy_for(class, *d)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tables_are_total() {
        for class in DeviceClass::ALL {
            for dim in Dimension::ALL {
                assert!(!strategy_for(class, dim).is_empty(), "{class}/{dim}");
            }
        }
    }

    #[test]
    fn test_each_dimension_distinguishes_tiers() {
        for dim in Dimension::ALL {
            let distinct: HashSet<_> = DeviceClass::ALL.iter().map(|c| strategy_for(*c, dim)).collect();
            assert_eq!(distinct.len(), DeviceClass::ALL.len(), "{dim}");
        }
    }

    #[test]
    fn test_known_entries() {
        assert_eq!(strategy_for(DeviceClass::Desktop, Dimension::Scheduling), "fair-share");
        assert_eq!(strategy_for(DeviceClass::Server, Dimension::Display), "headless-console");
        assert_eq!(strategy_for(DeviceClass::Calculator, Dimension::Network), "none");
    }

    #[test]
    fn test_profile_order() {
        let profile = strategy_profile(DeviceClass::Mobile);
        let dims: Vec<_> = profile.iter().map(|(d, _)| *d).collect();
        assert_eq!(dims, Dimension::ALL.to_vec());
    }

    #[test]
    fn test_dimension_from_str() {
        assert_eq!("Memory".parse::<Dimension>().unwrap(), Dimension::Memory);
        assert_eq!(" filesystem ".parse::<Dimension>().unwrap(), Dimension::Filesystem);
        assert!("power".parse::<Dimension>().is_err());
    }
}
