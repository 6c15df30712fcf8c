use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exit code for a clean drain
pub const EXIT_CLEAN: i32 = 0;
/// Exit code for startup or runtime errors
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when the grace period expired before in-flight work finished
pub const EXIT_GRACE_EXPIRED: i32 = 3;
/// Base for escalation exit codes (128 + signal number)
pub const EXIT_SIGNAL_BASE: i32 = 128;

/// Daemon lifecycle states, ordered by rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Starting,
    Ready,
    Draining,
    Stopped,
}

impl ProcessState {
    /// Only forward moves are legal
    pub fn can_advance_to(self, next: ProcessState) -> bool {
        next > self
    }

    pub fn accepts_work(self) -> bool {
        self == ProcessState::Ready
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::Draining => "draining",
            ProcessState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(ProcessState::Starting),
            "ready" => Ok(ProcessState::Ready),
            "draining" => Ok(ProcessState::Draining),
            "stopped" => Ok(ProcessState::Stopped),
            other => Err(format!("unknown process state '{}'", other)),
        }
    }
}

/// OS-independent classification of process-control notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Interrupt,
    Terminate,
    HangupReload,
    Kill,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Interrupt,
        SignalKind::Terminate,
        SignalKind::HangupReload,
        SignalKind::Kill,
    ];

    /// Conventional POSIX number, used for exit-code arithmetic on every platform
    pub fn posix_number(self) -> i32 {
        match self {
            SignalKind::HangupReload => 1,
            SignalKind::Interrupt => 2,
            SignalKind::Kill => 9,
            SignalKind::Terminate => 15,
        }
    }

    pub fn is_termination(self) -> bool {
        matches!(self, SignalKind::Interrupt | SignalKind::Terminate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Interrupt => "interrupt",
            SignalKind::Terminate => "terminate",
            SignalKind::HangupReload => "hangup-reload",
            SignalKind::Kill => "kill",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interrupt" | "int" | "sigint" => Ok(SignalKind::Interrupt),
            "terminate" | "term" | "sigterm" => Ok(SignalKind::Terminate),
            "hangup-reload" | "hangup" | "hup" | "sighup" => Ok(SignalKind::HangupReload),
            "kill" | "sigkill" => Ok(SignalKind::Kill),
            other => Err(format!("unknown signal kind '{}'", other)),
        }
    }
}

/// A delivered signal, consumed once by the dispatch logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    pub kind: SignalKind,
    pub received_at: DateTime<Utc>,
}

impl SignalEvent {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            received_at: Utc::now(),
        }
    }
}

/// What `on_signal` decided for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    BeginDrain,
    Escalate,
    Reload,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Kill is never observable by a handler
    Uncatchable,
    /// Reload is only honoured while Ready
    NotReady,
    /// The process is already terminating
    AfterStop,
}

/// The edge taken from Draining to Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Drained,
    GraceExpired,
    Escalated(SignalKind),
}

impl StopReason {
    pub fn exit_code(self) -> i32 {
        match self {
            StopReason::Drained => EXIT_CLEAN,
            StopReason::GraceExpired => EXIT_GRACE_EXPIRED,
            StopReason::Escalated(kind) => EXIT_SIGNAL_BASE + kind.posix_number(),
        }
    }

    pub fn is_graceful(self) -> bool {
        matches!(self, StopReason::Drained)
    }

    pub fn label(self) -> String {
        match self {
            StopReason::Drained => "drained".to_string(),
            StopReason::GraceExpired => "grace-expired".to_string(),
            StopReason::Escalated(kind) => format!("escalated-{}", kind),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
