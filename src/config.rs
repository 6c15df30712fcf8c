use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default configuration file name, looked up relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dvm.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DvmConfig {
    pub lifecycle: LifecycleConfig,
    pub workload: WorkloadConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Time allowed for in-flight work to finish after a termination request
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkloadConfig {
    /// Number of background workers processing work units
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Duration of a single work unit (reloadable)
    #[serde(default = "default_unit_duration_ms")]
    pub unit_duration_ms: u64,

    /// Upper bound for jobs submitted through the control plane (reloadable)
    #[serde(default = "default_max_job_duration_ms")]
    pub max_job_duration_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ControlConfig {
    /// Serve the HTTP control plane
    #[serde(default = "default_control_enabled")]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_control_ip")]
    pub ip: String,

    /// Port to listen on (0 picks an ephemeral port)
    #[serde(default = "default_control_port")]
    pub port: u16,
}

impl LifecycleConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl WorkloadConfig {
    pub fn unit_duration(&self) -> Duration {
        Duration::from_millis(self.unit_duration_ms)
    }

    pub fn max_job_duration(&self) -> Duration {
        Duration::from_millis(self.max_job_duration_ms)
    }
}

impl ControlConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl DvmConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path.
    ///
    /// The file is optional; environment variables use the `DVM_` prefix and a
    /// double underscore between section and key, e.g. `DVM_LIFECYCLE__GRACE_PERIOD_MS`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("lifecycle.grace_period_ms", default_grace_period_ms())?
            .set_default("workload.workers", default_workers() as u64)?
            .set_default("workload.unit_duration_ms", default_unit_duration_ms())?
            .set_default(
                "workload.max_job_duration_ms",
                default_max_job_duration_ms(),
            )?
            .set_default("control.enabled", default_control_enabled())?
            .set_default("control.ip", default_control_ip())?
            .set_default("control.port", default_control_port())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with DVM_ prefix
            .add_source(
                Environment::with_prefix("DVM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DvmConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.grace_period_ms == 0 {
            return Err(ConfigError::Message(
                "Lifecycle grace_period_ms must be greater than 0".to_string(),
            ));
        }

        if self.workload.workers == 0 {
            return Err(ConfigError::Message(
                "Workload workers must be greater than 0".to_string(),
            ));
        }

        if self.workload.unit_duration_ms == 0 {
            return Err(ConfigError::Message(
                "Workload unit_duration_ms must be greater than 0".to_string(),
            ));
        }

        if self.workload.max_job_duration_ms == 0 {
            return Err(ConfigError::Message(
                "Workload max_job_duration_ms must be greater than 0".to_string(),
            ));
        }

        if self.control.enabled && self.control.ip.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Message(format!(
                "Control ip '{}' is not a valid IP address",
                self.control.ip
            )));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Command-line overrides, applied after file and environment sources.
/// Kept around so a reload re-applies them on top of the re-read file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub grace_period_ms: Option<u64>,
    pub workers: Option<usize>,
    pub unit_duration_ms: Option<u64>,
    pub control_port: Option<u16>,
    pub disable_control: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut DvmConfig) {
        if let Some(grace_period_ms) = self.grace_period_ms {
            config.lifecycle.grace_period_ms = grace_period_ms;
        }
        if let Some(workers) = self.workers {
            config.workload.workers = workers;
        }
        if let Some(unit_duration_ms) = self.unit_duration_ms {
            config.workload.unit_duration_ms = unit_duration_ms;
        }
        if let Some(port) = self.control_port {
            config.control.port = port;
        }
        if self.disable_control {
            config.control.enabled = false;
        }
    }
}

impl Default for DvmConfig {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig {
                grace_period_ms: default_grace_period_ms(),
            },
            workload: WorkloadConfig {
                workers: default_workers(),
                unit_duration_ms: default_unit_duration_ms(),
                max_job_duration_ms: default_max_job_duration_ms(),
            },
            control: ControlConfig {
                enabled: default_control_enabled(),
                ip: default_control_ip(),
                port: default_control_port(),
            },
        }
    }
}

// Default value functions
fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_workers() -> usize {
    2
}
fn default_unit_duration_ms() -> u64 {
    250
}
fn default_max_job_duration_ms() -> u64 {
    60_000
}

fn default_control_enabled() -> bool {
    true
}
fn default_control_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_control_port() -> u16 {
    50051
}
