use crate::config::{ConfigOverrides, DvmConfig};
use crate::error::Result;
use crate::lifecycle::ReloadHandler;
use crate::workload::WorkerPool;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Re-reads the configuration file on HangupReload and applies the
/// workload settings that can change without a restart.
pub struct ConfigReloader {
    path: PathBuf,
    overrides: ConfigOverrides,
    current: Mutex<DvmConfig>,
    pool: Arc<WorkerPool>,
}

impl ConfigReloader {
    pub fn new(
        path: PathBuf,
        overrides: ConfigOverrides,
        current: DvmConfig,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            path,
            overrides,
            current: Mutex::new(current),
            pool,
        }
    }

    pub fn current(&self) -> DvmConfig {
        self.current.lock().clone()
    }
}

#[async_trait]
impl ReloadHandler for ConfigReloader {
    async fn reload(&self) -> Result<()> {
        let mut updated = DvmConfig::load_from_file(&self.path)?;
        self.overrides.apply(&mut updated);
        updated.validate()?;

        let mut current = self.current.lock();

        if updated.lifecycle != current.lifecycle {
            warn!("Lifecycle settings changed; restart required to apply them");
        }
        if updated.control != current.control {
            warn!("Control plane settings changed; restart required to apply them");
        }
        if updated.workload.workers != current.workload.workers {
            warn!("Worker count changed; restart required to apply it");
        }

        if self.pool.apply_settings(&updated.workload) {
            current.workload.unit_duration_ms = updated.workload.unit_duration_ms;
            current.workload.max_job_duration_ms = updated.workload.max_job_duration_ms;
        } else {
            info!("Configuration reloaded, no workload changes");
        }

        Ok(())
    }
}
