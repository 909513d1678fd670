//! Per-synchronizer lock counters.
//!
//! The per-tier entry counters only count fast-path grants. Entries resolved by the slow path are counted
//! by `SlowPathEntries`, and those that end up owning an inflated monitor also by `MonitorEntries`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Counter {
    TotalEntries = 0,
    BiasedLockEntries,
    AnonymouslyBiasedLockEntries,
    RebiasedLockEntries,
    RevokedLockEntries,
    FastPathEntries,
    StackLockEntries,
    RecursiveStackLockEntries,
    InflatedLockEntries,
    FastPathExits,
    SlowPathEntries,
    SlowPathExits,
    Inflations,
    Revocations,
    /// Acquisitions of an inflated monitor by the slow path, including ones that blocked.
    MonitorEntries,
}

impl Counter {
    const COUNT: usize = 15;
}

pub struct LockCounters {
    enabled: bool,
    values: [AtomicUsize; Counter::COUNT],
}

impl LockCounters {
    pub fn new(enabled: bool) -> Self {
        LockCounters {
            enabled,
            values: Default::default(),
        }
    }

    #[inline]
    pub fn record(&self, counter: Counter) {
        if self.enabled {
            self.values[counter as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, counter: Counter) -> usize {
        self.values[counter as usize].load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        for value in &self.values {
            value.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> LockStatistics {
        LockStatistics {
            total_entries: self.get(Counter::TotalEntries),
            biased_lock_entries: self.get(Counter::BiasedLockEntries),
            anonymously_biased_lock_entries: self.get(Counter::AnonymouslyBiasedLockEntries),
            rebiased_lock_entries: self.get(Counter::RebiasedLockEntries),
            revoked_lock_entries: self.get(Counter::RevokedLockEntries),
            fast_path_entries: self.get(Counter::FastPathEntries),
            stack_lock_entries: self.get(Counter::StackLockEntries),
            recursive_stack_lock_entries: self.get(Counter::RecursiveStackLockEntries),
            inflated_lock_entries: self.get(Counter::InflatedLockEntries),
            fast_path_exits: self.get(Counter::FastPathExits),
            slow_path_entries: self.get(Counter::SlowPathEntries),
            slow_path_exits: self.get(Counter::SlowPathExits),
            inflations: self.get(Counter::Inflations),
            revocations: self.get(Counter::Revocations),
            monitor_entries: self.get(Counter::MonitorEntries),
        }
    }
}

impl Default for LockCounters {
    fn default() -> Self {
        LockCounters::new(true)
    }
}

/// Point-in-time copy of [`LockCounters`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatistics {
    pub total_entries: usize,
    pub biased_lock_entries: usize,
    pub anonymously_biased_lock_entries: usize,
    pub rebiased_lock_entries: usize,
    pub revoked_lock_entries: usize,
    pub fast_path_entries: usize,
    pub stack_lock_entries: usize,
    pub recursive_stack_lock_entries: usize,
    pub inflated_lock_entries: usize,
    pub fast_path_exits: usize,
    pub slow_path_entries: usize,
    pub slow_path_exits: usize,
    pub inflations: usize,
    pub revocations: usize,
    pub monitor_entries: usize,
}
