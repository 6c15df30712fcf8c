use super::*;
use crate::lifecycle::ReloadHandler;

fn test_config() -> DvmConfig {
    let mut config = DvmConfig::default();
    config.lifecycle.grace_period_ms = 1_000;
    config.workload.workers = 2;
    config.workload.unit_duration_ms = 50;
    config.control.enabled = false;
    config
}

fn write_config(file: &tempfile::NamedTempFile, unit_ms: u64, workers: usize) {
    let contents = format!(
        "[workload]\nworkers = {}\nunit_duration_ms = {}\nmax_job_duration_ms = 900\n\n[control]\nenabled = false\n",
        workers, unit_ms
    );
    std::fs::write(file.path(), contents).unwrap();
}

#[tokio::test]
async fn test_start_reaches_ready_with_work_in_flight() {
    let mut daemon = Daemon::new(test_config());
    daemon.start().await.unwrap();

    assert_eq!(daemon.core().state(), ProcessState::Ready);
    assert_eq!(daemon.pool().stats().in_flight, 2);
    assert!(daemon.control_addr().is_none());
}

#[tokio::test]
async fn test_run_requires_start() {
    let mut daemon = Daemon::new(test_config());
    assert!(daemon.run().await.is_err());
}

#[cfg(feature = "http")]
#[tokio::test]
async fn test_start_binds_control_plane() {
    let mut config = test_config();
    config.control.enabled = true;
    config.control.port = 0;

    let mut daemon = Daemon::new(config);
    daemon.start().await.unwrap();

    let addr = daemon.control_addr().expect("control plane bound");
    assert_ne!(addr.port(), 0);
}

#[tokio::test]
async fn test_reload_applies_workload_settings() {
    let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write_config(&file, 50, 2);

    let config = DvmConfig::load_from_file(file.path()).unwrap();
    let core = LifecycleCore::new(config.lifecycle.grace_period());
    let pool = Arc::new(WorkerPool::new(core.work_gate(), config.workload.clone()));
    let reloader = ConfigReloader::new(
        file.path().to_path_buf(),
        ConfigOverrides::default(),
        config,
        Arc::clone(&pool),
    );

    write_config(&file, 120, 6);
    reloader.reload().await.unwrap();

    assert_eq!(pool.settings().unit_duration_ms, 120);
    assert_eq!(pool.settings().workers, 2);
    assert_eq!(reloader.current().workload.unit_duration_ms, 120);
}

#[tokio::test]
async fn test_reload_reapplies_overrides() {
    let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write_config(&file, 50, 2);

    let overrides = ConfigOverrides {
        unit_duration_ms: Some(10),
        ..Default::default()
    };
    let mut config = DvmConfig::load_from_file(file.path()).unwrap();
    overrides.apply(&mut config);

    let core = LifecycleCore::new(config.lifecycle.grace_period());
    let pool = Arc::new(WorkerPool::new(core.work_gate(), config.workload.clone()));
    let reloader = ConfigReloader::new(file.path().to_path_buf(), overrides, config, Arc::clone(&pool));

    write_config(&file, 300, 2);
    reloader.reload().await.unwrap();

    assert_eq!(pool.settings().unit_duration_ms, 10);
    assert_eq!(pool.settings().max_job_duration_ms, 900);
}

#[tokio::test]
async fn test_invalid_reload_keeps_settings() {
    let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write_config(&file, 50, 2);

    let config = DvmConfig::load_from_file(file.path()).unwrap();
    let core = LifecycleCore::new(config.lifecycle.grace_period());
    let pool = Arc::new(WorkerPool::new(core.work_gate(), config.workload.clone()));
    let reloader = ConfigReloader::new(
        file.path().to_path_buf(),
        ConfigOverrides::default(),
        config,
        Arc::clone(&pool),
    );

    write_config(&file, 0, 2);
    assert!(reloader.reload().await.is_err());
    assert_eq!(pool.settings().unit_duration_ms, 50);
}
