//! Optimization policy
//!
//! Fixed table from device tier to optimization level. Several tiers share
//! a level; every level is reachable.

use super::DeviceClass;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse optimization knob, least aggressive first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptimizationLevel {
    /// Do as little as possible
    Minimal,
    /// Conservative defaults
    Basic,
    /// Balanced defaults
    Standard,
    /// Trade memory for throughput
    Aggressive,
    /// Use everything available
    Extreme,
}

impl OptimizationLevel {
    /// All levels in ascending order
    pub const ALL: [OptimizationLevel; 5] = [
        OptimizationLevel::Minimal,
        OptimizationLevel::Basic,
        OptimizationLevel::Standard,
        OptimizationLevel::Aggressive,
        OptimizationLevel::Extreme,
    ];

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            OptimizationLevel::Minimal => "Minimal",
            OptimizationLevel::Basic => "Basic",
            OptimizationLevel::Standard => "Standard",
            OptimizationLevel::Aggressive => "Aggressive",
            OptimizationLevel::Extreme => "Extreme",
        }
    }

    /// Queue slots per scheduler worker
    pub fn queue_depth_per_worker(self) -> usize {
        match self {
            OptimizationLevel::Minimal => 4,
            OptimizationLevel::Basic => 8,
            OptimizationLevel::Standard => 16,
            OptimizationLevel::Aggressive => 32,
            OptimizationLevel::Extreme => 64,
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optimization level for a device tier
pub fn level_for(class: DeviceClass) -> OptimizationLevel {
    match class {
        DeviceClass::Calculator => OptimizationLevel::Minimal,
        DeviceClass::Embedded => OptimizationLevel::Basic,
        DeviceClass::Mobile | DeviceClass::Desktop => OptimizationLevel::Standard,
        DeviceClass::Workstation | DeviceClass::Server => OptimizationLevel::Aggressive,
        DeviceClass::Cluster | DeviceClass::Supercomputer => OptimizationLevel::Extreme,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_level_table() {
        let expected = [
            (DeviceClass::Calculator, OptimizationLevel::Minimal),
            (DeviceClass::Embedded, OptimizationLevel::Basic),
            (DeviceClass::Mobile, OptimizationLevel::Standard),
            (DeviceClass::Desktop, OptimizationLevel::Standard),
            (DeviceClass::Workstation, OptimizationLevel::Aggressive),
            (DeviceClass::Server, OptimizationLevel::Aggressive),
            (DeviceClass::Cluster, OptimizationLevel::Extreme),
            (DeviceClass::Supercomputer, OptimizationLevel::Extreme),
        ];
        for (class, level) in expected {
            assert_eq!(level_for(class), level, "{class}");
        }
    }

    #[test]
    fn test_mapping_is_surjective_and_pure() {
        let reached: HashSet<_> = DeviceClass::ALL.iter().map(|c| level_for(*c)).collect();
        assert_eq!(reached.len(), OptimizationLevel::ALL.len());

        for class in DeviceClass::ALL {
            assert_eq!(level_for(class), level_for(class));
        }
    }

    #[test]
    fn test_level_is_monotonic_in_tier() {
        for pair in DeviceClass::ALL.windows(2) {
            assert!(level_for(pair[1]) >= level_for(pair[0]));
        }
    }

    #[test]
    fn test_queue_depth_grows_with_level() {
        for pair in OptimizationLevel::ALL.windows(2) {
            assert!(pair[1].queue_depth_per_worker() > pair[0].queue_depth_per_worker());
        }
    }
}
