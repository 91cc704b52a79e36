use stampede_core::RunPlan;
use std::fmt;

/// Lifecycle of a run. Phases only move forward.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Idle,
    RampUp,
    Sustain,
    Finalizing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::RampUp => "ramp-up",
            Phase::Sustain => "sustain",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Maps an item's dispatch index to its phase and concurrency level.
///
/// Ramp items climb linearly: item `i` of `R` ramp items runs at `1 + floor(i * M / R)` where
/// `M` is the max concurrency level, so the first ramp item always runs at 1. When `R >= M`
/// the last ramp item lands exactly on `M`; with fewer ramp items than levels the ramp tops out
/// below `M` and the first sustain item jumps the rest of the way. Every sustain item runs at
/// `M`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RampSchedule {
    ramp_items: u64,
    total_items: u64,
    max_level: usize,
}

impl RampSchedule {
    pub fn new(plan: &RunPlan) -> Self {
        Self {
            ramp_items: plan.items_for_ramp_up,
            total_items: plan.total_items(),
            max_level: plan.max_concurrency_level.max(1),
        }
    }

    pub fn phase(&self, index: u64) -> Phase {
        if index < self.ramp_items {
            Phase::RampUp
        } else {
            Phase::Sustain
        }
    }

    pub fn level(&self, index: u64) -> usize {
        if index >= self.ramp_items {
            return self.max_level;
        }
        let max = self.max_level as u128;
        let level = 1 + (index as u128 * max) / self.ramp_items as u128;
        (level as usize).clamp(1, self.max_level)
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub fn ramp_items(&self) -> u64 {
        self.ramp_items
    }

    pub fn total_items(&self) -> u64 {
        self.total_items
    }
}
