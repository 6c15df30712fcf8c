use super::job::Job;
use super::stats::{WorkloadSnapshot, WorkloadStats};
use crate::config::WorkloadConfig;
use crate::error::{DvmError, Result, WorkloadError};
use crate::lifecycle::WorkGate;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Background workers plus admission of submitted jobs.
///
/// Workers are tracked in-flight work for their whole lifetime: each one
/// processes units back to back and exits after the unit during which
/// draining began. The first unit of every worker is admitted at launch,
/// so a Ready daemon always has work in flight.
pub struct WorkerPool {
    gate: WorkGate,
    settings: Arc<RwLock<WorkloadConfig>>,
    stats: Arc<WorkloadStats>,
}

impl WorkerPool {
    pub fn new(gate: WorkGate, settings: WorkloadConfig) -> Self {
        Self {
            gate,
            settings: Arc::new(RwLock::new(settings)),
            stats: Arc::new(WorkloadStats::default()),
        }
    }

    /// Spawn the configured number of workers
    pub fn launch(&self) -> Result<usize> {
        let workers = self.settings.read().workers;

        for id in 0..workers {
            let gate = self.gate.clone();
            let settings = Arc::clone(&self.settings);
            let stats = Arc::clone(&self.stats);

            self.gate
                .launch(run_worker(id, gate, settings, stats))
                .ok_or_else(|| {
                    DvmError::component(
                        "workload".to_string(),
                        format!("worker {} refused in state {}", id, self.gate.state()),
                    )
                })?;
        }

        info!("Launched {} worker(s)", workers);
        Ok(workers)
    }

    /// Admit a job that runs for `duration` as tracked in-flight work
    pub fn submit(&self, duration: Duration) -> std::result::Result<Job, WorkloadError> {
        let max = self.settings.read().max_job_duration();
        if duration > max {
            self.stats.record_job_rejected();
            return Err(WorkloadError::DurationTooLong {
                requested_ms: duration.as_millis() as u64,
                max_ms: max.as_millis() as u64,
            });
        }

        let job = Job::new(duration);
        let stats = Arc::clone(&self.stats);
        let job_id = job.id;

        let admitted = self.gate.admit(async move {
            tokio::time::sleep(duration).await;
            stats.record_job_completed();
            debug!("Job {} completed", job_id);
        });

        match admitted {
            Some(_) => {
                self.stats.record_job_accepted();
                debug!("Job {} accepted ({:?})", job.id, job.duration);
                Ok(job)
            }
            None => {
                self.stats.record_job_rejected();
                Err(WorkloadError::NotAccepting {
                    state: self.gate.state(),
                })
            }
        }
    }

    /// Replace reloadable settings. Returns true when anything changed.
    ///
    /// The worker count is fixed at launch and is not changed here.
    pub fn apply_settings(&self, update: &WorkloadConfig) -> bool {
        let mut settings = self.settings.write();
        let changed = settings.unit_duration_ms != update.unit_duration_ms
            || settings.max_job_duration_ms != update.max_job_duration_ms;

        if changed {
            settings.unit_duration_ms = update.unit_duration_ms;
            settings.max_job_duration_ms = update.max_job_duration_ms;
            self.stats.record_settings_applied();
            info!(
                "Workload settings updated: unit {}ms, max job {}ms",
                settings.unit_duration_ms, settings.max_job_duration_ms
            );
        }

        changed
    }

    pub fn settings(&self) -> WorkloadConfig {
        self.settings.read().clone()
    }

    pub fn stats(&self) -> WorkloadSnapshot {
        self.stats.snapshot(self.gate.in_flight())
    }

    pub fn gate(&self) -> &WorkGate {
        &self.gate
    }
}

async fn run_worker(
    id: usize,
    gate: WorkGate,
    settings: Arc<RwLock<WorkloadConfig>>,
    stats: Arc<WorkloadStats>,
) {
    debug!("Worker {} started", id);

    loop {
        let unit = settings.read().unit_duration();
        tokio::time::sleep(unit).await;
        stats.record_unit();

        if gate.is_closed() {
            break;
        }
    }

    debug!("Worker {} finished", id);
}
