use crate::lifecycle::{ProcessState, SignalKind};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DvmError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register handler for {kind}: {source}")]
    SignalRegistration {
        kind: SignalKind,
        #[source]
        source: std::io::Error,
    },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl DvmError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DvmError>;

/// Reasons a job submission is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("daemon is {state} and not accepting work")]
    NotAccepting { state: ProcessState },

    #[error("requested duration {requested_ms}ms exceeds limit of {max_ms}ms")]
    DurationTooLong { requested_ms: u64, max_ms: u64 },
}

/// Which wait the harness was blocked in when a deadline fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Readiness,
    Exit,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPhase::Readiness => write!(f, "readiness"),
            WaitPhase::Exit => write!(f, "exit"),
        }
    }
}

/// Failures surfaced by the shutdown harness to its scenario runner
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("daemon did not reach {phase} within {elapsed:?} (last known state: {})", display_state(.last_state))]
    Timeout {
        phase: WaitPhase,
        elapsed: Duration,
        last_state: Option<ProcessState>,
    },

    #[error("expected {expected} shutdown, observed {outcome}")]
    UnexpectedExitCode {
        expected: crate::harness::Expectation,
        outcome: crate::harness::ShutdownOutcome,
    },

    #[error("signal {kind} is not supported on {os}")]
    SignalUnsupported { kind: SignalKind, os: &'static str },

    #[error("failed to launch {program}: {reason}")]
    SpawnFailure { program: String, reason: String },

    #[error("failed to deliver {kind}: {source}")]
    SignalDelivery {
        kind: SignalKind,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while supervising daemon: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn spawn_failure<P: Into<String>, R: Into<String>>(program: P, reason: R) -> Self {
        Self::SpawnFailure {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Skips are reported separately from failures
    pub fn is_skip(&self) -> bool {
        matches!(self, HarnessError::SignalUnsupported { .. })
    }
}

fn display_state(state: &Option<ProcessState>) -> String {
    state
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
