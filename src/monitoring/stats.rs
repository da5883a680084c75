/*!
 * Compatibility Layer Statistics
 * Relaxed atomic counters shared by the multiplexer, executor and socket adapter
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for lock-free updates
///
/// # Performance
/// - Cache-line aligned to prevent false sharing with neighbouring state
/// - Relaxed ordering; counters never synchronize other memory
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CompatStats {
    select_calls: AtomicU64,
    select_timeouts: AtomicU64,
    workers_spawned: AtomicU64,
    interrupts: AtomicU64,
    graceful_cancels: AtomicU64,
    forced_terminations: AtomicU64,
    leaked_stacks: AtomicU64,
    overlapped_pending: AtomicU64,
}

/// Point-in-time copy of [`CompatStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub select_calls: u64,
    pub select_timeouts: u64,
    pub workers_spawned: u64,
    pub interrupts: u64,
    pub graceful_cancels: u64,
    pub forced_terminations: u64,
    pub leaked_stacks: u64,
    pub overlapped_pending: u64,
}

impl CompatStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_select_calls(&self) {
        self.select_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_select_timeouts(&self) {
        self.select_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_workers_spawned(&self) {
        self.workers_spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Blocking calls that returned EINTR because of a pending interrupt
    #[inline(always)]
    pub fn inc_interrupts(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_graceful_cancels(&self) {
        self.graceful_cancels.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_forced_terminations(&self) {
        self.forced_terminations.fetch_add(1, Ordering::Relaxed);
    }

    /// Workers abandoned without their stack being reclaimed
    #[inline(always)]
    pub fn inc_leaked_stacks(&self) {
        self.leaked_stacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Overlapped socket transfers that had to wait for readiness
    #[inline(always)]
    pub fn inc_overlapped_pending(&self) {
        self.overlapped_pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            select_calls: self.select_calls.load(Ordering::Relaxed),
            select_timeouts: self.select_timeouts.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
            graceful_cancels: self.graceful_cancels.load(Ordering::Relaxed),
            forced_terminations: self.forced_terminations.load(Ordering::Relaxed),
            leaked_stacks: self.leaked_stacks.load(Ordering::Relaxed),
            overlapped_pending: self.overlapped_pending.load(Ordering::Relaxed),
        }
    }
}
