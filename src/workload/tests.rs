use super::*;
use crate::config::WorkloadConfig;
use crate::error::WorkloadError;
use crate::lifecycle::{LifecycleCore, ProcessState, SignalEvent, SignalKind, StopReason};
use std::time::Duration;
use tokio::sync::mpsc;

fn workload(workers: usize, unit_ms: u64) -> WorkloadConfig {
    WorkloadConfig {
        workers,
        unit_duration_ms: unit_ms,
        max_job_duration_ms: 1_000,
    }
}

#[tokio::test]
async fn test_ready_daemon_always_has_work_in_flight() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    let pool = WorkerPool::new(core.work_gate(), workload(3, 200));

    assert_eq!(pool.launch().unwrap(), 3);
    assert!(core.mark_ready());
    assert_eq!(pool.stats().in_flight, 3);
}

#[tokio::test]
async fn test_workers_finish_current_unit_when_draining() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    let pool = WorkerPool::new(core.work_gate(), workload(2, 100));
    pool.launch().unwrap();
    core.mark_ready();

    let (sender, mut receiver) = mpsc::unbounded_channel();
    sender.send(SignalEvent::new(SignalKind::Terminate)).unwrap();

    let reason = core
        .run(&mut receiver, &crate::lifecycle::NoReload)
        .await
        .unwrap();

    assert_eq!(reason, StopReason::Drained);
    let stats = pool.stats();
    assert_eq!(stats.in_flight, 0);
    assert!(stats.units_completed >= 2);
}

#[tokio::test]
async fn test_jobs_rejected_unless_ready() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    let pool = WorkerPool::new(core.work_gate(), workload(1, 50));

    assert_eq!(
        pool.submit(Duration::from_millis(10)).unwrap_err(),
        WorkloadError::NotAccepting {
            state: ProcessState::Starting
        }
    );

    core.mark_ready();
    let job = pool.submit(Duration::from_millis(10)).unwrap();
    assert_eq!(job.duration, Duration::from_millis(10));

    core.on_signal(SignalEvent::new(SignalKind::Interrupt));
    assert_eq!(
        pool.submit(Duration::from_millis(10)).unwrap_err(),
        WorkloadError::NotAccepting {
            state: ProcessState::Draining
        }
    );

    let stats = pool.stats();
    assert_eq!(stats.jobs_accepted, 1);
    assert_eq!(stats.jobs_rejected, 2);
}

#[tokio::test]
async fn test_job_duration_is_bounded() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    core.mark_ready();
    let pool = WorkerPool::new(core.work_gate(), workload(1, 50));

    let err = pool.submit(Duration::from_secs(5)).unwrap_err();
    assert_eq!(
        err,
        WorkloadError::DurationTooLong {
            requested_ms: 5_000,
            max_ms: 1_000
        }
    );
}

#[tokio::test]
async fn test_accepted_jobs_complete_before_drain_finishes() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    core.mark_ready();
    let pool = WorkerPool::new(core.work_gate(), workload(1, 50));
    pool.submit(Duration::from_millis(150)).unwrap();

    let (sender, mut receiver) = mpsc::unbounded_channel();
    sender.send(SignalEvent::new(SignalKind::Terminate)).unwrap();
    let reason = core
        .run(&mut receiver, &crate::lifecycle::NoReload)
        .await
        .unwrap();

    assert_eq!(reason, StopReason::Drained);
    let stats = pool.stats();
    assert_eq!(stats.jobs_completed, 1);
    assert_eq!(stats.jobs_pending(), 0);
}

#[test]
fn test_apply_settings_only_touches_reloadable_fields() {
    let core = LifecycleCore::new(Duration::from_secs(5));
    let pool = WorkerPool::new(core.work_gate(), workload(2, 100));

    assert!(!pool.apply_settings(&workload(2, 100)));

    let mut update = workload(8, 300);
    update.max_job_duration_ms = 2_000;
    assert!(pool.apply_settings(&update));

    let settings = pool.settings();
    assert_eq!(settings.workers, 2);
    assert_eq!(settings.unit_duration_ms, 300);
    assert_eq!(settings.max_job_duration_ms, 2_000);
    assert_eq!(pool.stats().settings_applied, 1);
}
