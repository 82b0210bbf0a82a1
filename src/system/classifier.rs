//! Device tier classification
//!
//! Maps a `HardwareFacts` snapshot onto one of eight ordered tiers. Each
//! tier is a row in a static table; classification scans the table in
//! ascending order and keeps the last row whose thresholds are met.

use super::HardwareFacts;
use serde::{Deserialize, Serialize};
use std::fmt;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// Ordered device tier, smallest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Barely a computer
    Calculator,
    /// Microcontroller-class boards
    Embedded,
    /// Phones, tablets, small SBCs
    Mobile,
    /// Typical personal computer
    Desktop,
    /// High-end single-user machine
    Workstation,
    /// Rack server
    Server,
    /// Multi-node class hardware
    Cluster,
    /// Top of the scale
    Supercomputer,
}

/// Minimum capacity a machine needs to qualify for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierThresholds {
    /// Minimum total memory in bytes
    pub min_memory_bytes: u64,
    /// Minimum logical core count
    pub min_cores: u32,
}

impl TierThresholds {
    /// Does a machine with this capacity meet every threshold?
    pub fn is_met_by(&self, memory_bytes: u64, cores: u32) -> bool {
        memory_bytes >= self.min_memory_bytes && cores >= self.min_cores
    }
}

struct TierSpec {
    class: DeviceClass,
    thresholds: TierThresholds,
    name: &'static str,
    description: &'static str,
}

const fn tier(
    class: DeviceClass,
    min_memory_bytes: u64,
    min_cores: u32,
    name: &'static str,
    description: &'static str,
) -> TierSpec {
    TierSpec {
        class,
        thresholds: TierThresholds {
            min_memory_bytes,
            min_cores,
        },
        name,
        description,
    }
}

// Ascending order; `classify` depends on it.
static TIERS: [TierSpec; 8] = [
    tier(DeviceClass::Calculator, 0, 1, "Calculator", "Minimal computing device"),
    tier(DeviceClass::Embedded, 64 * MIB, 1, "Embedded", "Embedded system or IoT board"),
    tier(DeviceClass::Mobile, GIB, 2, "Mobile", "Phone, tablet or small single-board computer"),
    tier(DeviceClass::Desktop, 4 * GIB, 4, "Desktop", "Desktop or laptop computer"),
    tier(DeviceClass::Workstation, 16 * GIB, 8, "Workstation", "High-performance workstation"),
    tier(DeviceClass::Server, 32 * GIB, 16, "Server", "Enterprise server"),
    tier(DeviceClass::Cluster, 128 * GIB, 64, "Cluster", "Compute cluster node"),
    tier(DeviceClass::Supercomputer, TIB, 256, "Supercomputer", "Supercomputer-class system"),
];

impl DeviceClass {
    /// All tiers in ascending order
    pub const ALL: [DeviceClass; 8] = [
        DeviceClass::Calculator,
        DeviceClass::Embedded,
        DeviceClass::Mobile,
        DeviceClass::Desktop,
        DeviceClass::Workstation,
        DeviceClass::Server,
        DeviceClass::Cluster,
        DeviceClass::Supercomputer,
    ];

    fn spec(self) -> &'static TierSpec {
        &TIERS[self.rank()]
    }

    /// Position of the tier in the ordering (0 = Calculator)
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Thresholds a machine must meet for this tier
    pub fn thresholds(self) -> TierThresholds {
        self.spec().thresholds
    }

    /// Display name
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// One-line description
    pub fn description(self) -> &'static str {
        self.spec().description
    }

    /// Next tier up, if any
    pub fn next(self) -> Option<DeviceClass> {
        Self::ALL.get(self.rank() + 1).copied()
    }

    /// Lowest tier
    pub fn lowest() -> DeviceClass {
        DeviceClass::Calculator
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify a machine into the highest tier whose thresholds it meets.
///
/// Total over all inputs: the core count is clamped to at least one and a
/// machine that meets nothing lands in the lowest tier.
pub fn classify(facts: &HardwareFacts) -> DeviceClass {
    let cores = facts.effective_cores();
    let memory = facts.memory_bytes;

    let mut chosen = DeviceClass::lowest();
    for spec in &TIERS {
        if spec.thresholds.is_met_by(memory, cores) {
            chosen = spec.class;
        }
    }

    let thresholds = chosen.thresholds();
    tracing::debug!(
        cores,
        memory_bytes = memory,
        tier = %chosen,
        min_cores = thresholds.min_cores,
        min_memory_bytes = thresholds.min_memory_bytes,
        "Classified device"
    );

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn facts(cores: u32, memory: u64) -> HardwareFacts {
        HardwareFacts {
            core_count: cores,
            memory_bytes: memory,
            platform_name: "test".to_string(),
        }
    }

    #[test]
    fn test_table_matches_enum_order() {
        for (i, class) in DeviceClass::ALL.iter().enumerate() {
            assert_eq!(TIERS[i].class, *class);
            assert_eq!(class.rank(), i);
        }
    }

    #[test]
    fn test_thresholds_dominate() {
        for pair in DeviceClass::ALL.windows(2) {
            let lower = pair[0].thresholds();
            let upper = pair[1].thresholds();
            assert!(upper.min_memory_bytes > lower.min_memory_bytes);
            assert!(upper.min_cores >= lower.min_cores);
        }
    }

    #[test]
    fn test_desktop_scenario() {
        assert_eq!(classify(&facts(4, 10 * GIB)), DeviceClass::Desktop);
    }

    #[test]
    fn test_calculator_scenario() {
        assert_eq!(classify(&facts(1, 512)), DeviceClass::Calculator);
    }

    #[test]
    fn test_cluster_boundary_is_inclusive() {
        let class = classify(&facts(64, 128 * GIB));
        assert!(class >= DeviceClass::Cluster);
        assert_eq!(class, DeviceClass::Cluster);
    }

    #[test]
    fn test_highest_tier_wins() {
        // Meets every threshold, so it must not stop at the first match.
        assert_eq!(classify(&facts(1024, 4 * TIB)), DeviceClass::Supercomputer);
    }

    #[test]
    fn test_limited_by_scarcer_resource() {
        // Plenty of memory, few cores.
        assert_eq!(classify(&facts(2, 512 * GIB)), DeviceClass::Mobile);
        // Plenty of cores, little memory.
        assert_eq!(classify(&facts(128, 2 * GIB)), DeviceClass::Mobile);
    }

    #[test]
    fn test_zero_memory_and_cores() {
        assert_eq!(classify(&facts(0, 0)), DeviceClass::Calculator);
    }

    #[test]
    fn test_exact_thresholds_select_tier() {
        for class in DeviceClass::ALL {
            let t = class.thresholds();
            assert_eq!(classify(&facts(t.min_cores, t.min_memory_bytes)), class);
        }
    }

    #[test]
    fn test_next_and_display() {
        assert_eq!(DeviceClass::Calculator.next(), Some(DeviceClass::Embedded));
        assert_eq!(DeviceClass::Supercomputer.next(), None);
        assert_eq!(DeviceClass::Workstation.to_string(), "Workstation");
    }

    proptest! {
        #[test]
        fn prop_classify_is_total_and_pure(cores in any::<u32>(), memory in any::<u64>()) {
            let f = facts(cores, memory);
            let first = classify(&f);
            prop_assert_eq!(first, classify(&f));
            prop_assert!(DeviceClass::ALL.contains(&first));
        }

        #[test]
        fn prop_more_resources_never_lower_tier(
            cores in 0u32..512,
            memory in 0u64..(2 * TIB),
            extra_cores in 0u32..512,
            extra_memory in 0u64..(2 * TIB),
        ) {
            let smaller = classify(&facts(cores, memory));
            let larger = classify(&facts(cores + extra_cores, memory + extra_memory));
            prop_assert!(larger >= smaller);
        }

        #[test]
        fn prop_chosen_tier_is_highest_satisfied(cores in 1u32..1024, memory in 0u64..(4 * TIB)) {
            let chosen = classify(&facts(cores, memory));
            prop_assert!(chosen.thresholds().is_met_by(memory, cores) || chosen == DeviceClass::lowest());
            if let Some(next) = chosen.next() {
                prop_assert!(!next.thresholds().is_met_by(memory, cores));
            }
        }
    }
}
