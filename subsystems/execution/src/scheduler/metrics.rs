//! # Scheduler Metrics
//!
//! Counters for dispatch and reclamation activity.

use core::sync::atomic::{AtomicU64, Ordering};

/// Scheduler metrics
#[derive(Debug)]
pub struct SchedulerMetrics {
    /// Total context switches (boot switch included)
    context_switches: AtomicU64,
    /// Total voluntary yields
    voluntary_yields: AtomicU64,
    /// Active thread displaced by a higher-priority ready thread
    preemptions: AtomicU64,
    /// Threads created
    threads_created: AtomicU64,
    /// Exited threads whose stacks were released after a switch
    threads_reclaimed: AtomicU64,
    /// Descriptors destroyed
    threads_destroyed: AtomicU64,
}

impl SchedulerMetrics {
    /// Create new metrics
    pub const fn new() -> Self {
        Self {
            context_switches: AtomicU64::new(0),
            voluntary_yields: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            threads_created: AtomicU64::new(0),
            threads_reclaimed: AtomicU64::new(0),
            threads_destroyed: AtomicU64::new(0),
        }
    }

    /// Record a context switch
    pub fn record_context_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a voluntary yield
    pub fn record_yield(&self) {
        self.voluntary_yields.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a preemption
    pub fn record_preemption(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a thread creation
    pub fn record_create(&self) {
        self.threads_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a post-switch reclamation
    pub fn record_reclaim(&self) {
        self.threads_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a descriptor destruction
    pub fn record_destroy(&self) {
        self.threads_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total context switches
    pub fn context_switches(&self) -> u64 {
        self.context_switches.load(Ordering::Relaxed)
    }

    /// Get voluntary yields
    pub fn voluntary_yields(&self) -> u64 {
        self.voluntary_yields.load(Ordering::Relaxed)
    }

    /// Get preemptions
    pub fn preemptions(&self) -> u64 {
        self.preemptions.load(Ordering::Relaxed)
    }

    /// Get threads created
    pub fn threads_created(&self) -> u64 {
        self.threads_created.load(Ordering::Relaxed)
    }

    /// Get threads reclaimed
    pub fn threads_reclaimed(&self) -> u64 {
        self.threads_reclaimed.load(Ordering::Relaxed)
    }

    /// Get descriptors destroyed
    pub fn threads_destroyed(&self) -> u64 {
        self.threads_destroyed.load(Ordering::Relaxed)
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.context_switches.store(0, Ordering::Relaxed);
        self.voluntary_yields.store(0, Ordering::Relaxed);
        self.preemptions.store(0, Ordering::Relaxed);
        self.threads_created.store(0, Ordering::Relaxed);
        self.threads_reclaimed.store(0, Ordering::Relaxed);
        self.threads_destroyed.store(0, Ordering::Relaxed);
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
