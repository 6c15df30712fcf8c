use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for workload monitoring
#[derive(Debug, Default)]
pub struct WorkloadStats {
    units_completed: AtomicU64,
    jobs_accepted: AtomicU64,
    jobs_rejected: AtomicU64,
    jobs_completed: AtomicU64,
    settings_applied: AtomicU64,
}

impl WorkloadStats {
    pub fn record_unit(&self) {
        self.units_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_accepted(&self) {
        self.jobs_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settings_applied(&self) {
        self.settings_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, in_flight: usize) -> WorkloadSnapshot {
        WorkloadSnapshot {
            units_completed: self.units_completed.load(Ordering::Relaxed),
            jobs_accepted: self.jobs_accepted.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            settings_applied: self.settings_applied.load(Ordering::Relaxed),
            in_flight,
        }
    }
}

/// Point-in-time copy of the workload counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadSnapshot {
    pub units_completed: u64,
    pub jobs_accepted: u64,
    pub jobs_rejected: u64,
    pub jobs_completed: u64,
    pub settings_applied: u64,
    pub in_flight: usize,
}

impl WorkloadSnapshot {
    pub fn jobs_pending(&self) -> u64 {
        self.jobs_accepted.saturating_sub(self.jobs_completed)
    }
}
