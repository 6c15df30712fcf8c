mod reload;
#[cfg(test)]
mod tests;

pub use reload::ConfigReloader;

use crate::config::{ConfigOverrides, DvmConfig, DEFAULT_CONFIG_FILE};
use crate::error::{DvmError, Result};
use crate::lifecycle::{LifecycleCore, ProcessState, SignalReceiver, StopReason};
use crate::status::StatusLine;
use crate::workload::WorkerPool;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Top-level daemon: owns the lifecycle core, the workload and the control plane
pub struct Daemon {
    config: DvmConfig,
    config_path: PathBuf,
    overrides: ConfigOverrides,
    core: Arc<LifecycleCore>,
    pool: Arc<WorkerPool>,
    signals: Option<SignalReceiver>,
    control_addr: Option<SocketAddr>,
    background: Vec<JoinHandle<()>>,
}

impl Daemon {
    pub fn new(config: DvmConfig) -> Self {
        Self::with_source(config, PathBuf::from(DEFAULT_CONFIG_FILE), ConfigOverrides::default())
    }

    /// Create a daemon that reloads from `config_path` and re-applies `overrides`
    pub fn with_source(config: DvmConfig, config_path: PathBuf, overrides: ConfigOverrides) -> Self {
        let core = Arc::new(LifecycleCore::new(config.lifecycle.grace_period()));
        let pool = Arc::new(WorkerPool::new(core.work_gate(), config.workload.clone()));

        Self {
            config,
            config_path,
            overrides,
            core,
            pool,
            signals: None,
            control_addr: None,
            background: Vec::new(),
        }
    }

    pub fn core(&self) -> &Arc<LifecycleCore> {
        &self.core
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    /// Starting -> Ready.
    ///
    /// Signal interest is registered before anything else so a termination
    /// request that arrives during initialization is queued, not lost.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting dvm daemon");
        emit(StatusLine::State(ProcessState::Starting));

        self.signals = Some(self.core.start()?);
        self.background.push(spawn_state_reporter(&self.core));

        self.pool.launch()?;
        self.start_control().await?;

        if self.core.mark_ready() {
            emit(StatusLine::Ready {
                pid: std::process::id(),
                control: self.control_addr.map(|addr| addr.to_string()),
            });
        }

        Ok(())
    }

    #[cfg(feature = "http")]
    async fn start_control(&mut self) -> Result<()> {
        if !self.config.control.enabled {
            info!("Control plane disabled");
            return Ok(());
        }

        let server =
            crate::control::ControlServer::new(self.config.control.clone(), Arc::clone(&self.pool));
        let bound = server.bind().await?;
        self.control_addr = Some(bound.local_addr());
        self.background.push(bound.serve());
        Ok(())
    }

    #[cfg(not(feature = "http"))]
    async fn start_control(&mut self) -> Result<()> {
        if self.config.control.enabled {
            warn!("Control plane requested but dvm was built without the http feature");
        }
        Ok(())
    }

    /// Dispatch signals until the daemon stops and return how it stopped
    pub async fn run(&mut self) -> Result<StopReason> {
        info!("dvm daemon is running");

        let mut signals = self.signals.take().ok_or_else(|| {
            DvmError::system("Daemon must be started before it can run")
        })?;

        let reloader = ConfigReloader::new(
            self.config_path.clone(),
            self.overrides.clone(),
            self.config.clone(),
            Arc::clone(&self.pool),
        );

        let reason = match self.core.run(&mut signals, &reloader).await {
            Ok(reason) => reason,
            Err(e) => {
                error!("Lifecycle error: {}", e);
                return Err(e);
            }
        };

        let discarded = self.core.discard_pending(&mut signals);
        if discarded > 0 {
            debug!("Discarded {} signal(s) queued after stop", discarded);
        }

        let stats = self.pool.stats();
        if reason.is_graceful() {
            info!(
                "Shutdown complete: {} units, {} jobs completed",
                stats.units_completed, stats.jobs_completed
            );
        } else {
            warn!(
                "Forced shutdown ({}): abandoning {} in-flight task(s)",
                reason, stats.in_flight
            );
        }

        emit(StatusLine::stopped(reason));
        Ok(reason)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}

fn emit(line: StatusLine) {
    if let Err(e) = line.emit() {
        warn!("Failed to write status line '{}': {}", line, e);
    }
}

/// Report Draining on stdout as soon as it happens
fn spawn_state_reporter(core: &LifecycleCore) -> JoinHandle<()> {
    let mut states = core.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            if state == ProcessState::Draining {
                emit(StatusLine::State(state));
            }
        }
    })
}
