pub mod config;
pub mod daemon;
pub mod error;
pub mod harness;
pub mod lifecycle;
pub mod status;
pub mod workload;

#[cfg(feature = "http")]
pub mod control;

pub use config::{ConfigOverrides, DvmConfig};
pub use daemon::Daemon;
pub use error::{DvmError, HarnessError, Result, WorkloadError};
pub use harness::{Expectation, Scenario, ShutdownController, ShutdownOutcome};
pub use lifecycle::{LifecycleCore, ProcessState, SignalKind, StopReason};
pub use status::StatusLine;
pub use workload::WorkerPool;
