use crate::error::HarnessError;
use crate::lifecycle::EXIT_CLEAN;
use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

/// What the controller observed when the daemon terminated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownOutcome {
    /// Exit code, absent when the process died from a signal
    pub exit_code: Option<i32>,
    /// Signal that terminated the process (POSIX only)
    pub terminating_signal: Option<i32>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub graceful: bool,
}

impl ShutdownOutcome {
    /// Graceful means the clean exit code within the grace bound
    pub fn classify(status: ExitStatus, elapsed: Duration, grace_bound: Duration) -> Self {
        let exit_code = status.code();
        let graceful = exit_code == Some(EXIT_CLEAN) && elapsed < grace_bound;

        Self {
            exit_code,
            terminating_signal: terminating_signal(&status),
            elapsed,
            graceful,
        }
    }
}

#[cfg(unix)]
fn terminating_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn serialize_millis<S: serde::Serializer>(
    elapsed: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = if self.graceful { "graceful" } else { "forced" };
        match (self.exit_code, self.terminating_signal) {
            (Some(code), _) => write!(f, "{} exit code {} after {:?}", class, code, self.elapsed),
            (None, Some(signal)) => {
                write!(f, "{} death by signal {} after {:?}", class, signal, self.elapsed)
            }
            (None, None) => write!(f, "{} exit without code after {:?}", class, self.elapsed),
        }
    }
}

/// The classification a scenario asserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Graceful,
    Forced,
    /// Any termination is acceptable as long as it happens in time
    Terminates,
    /// The daemon must still be running after the window
    SurvivesWindow(Duration),
}

impl Expectation {
    pub fn from_graceful(expect_graceful: bool) -> Self {
        if expect_graceful {
            Expectation::Graceful
        } else {
            Expectation::Forced
        }
    }

    /// Check a terminal outcome against this expectation.
    /// A `SurvivesWindow` outcome is the cleanup shutdown, which must be graceful.
    pub fn verify(self, outcome: ShutdownOutcome) -> Result<ShutdownOutcome, HarnessError> {
        let matches = match self {
            Expectation::Graceful | Expectation::SurvivesWindow(_) => outcome.graceful,
            Expectation::Forced => !outcome.graceful,
            Expectation::Terminates => true,
        };

        if matches {
            Ok(outcome)
        } else {
            Err(HarnessError::UnexpectedExitCode {
                expected: self,
                outcome,
            })
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Graceful => write!(f, "graceful"),
            Expectation::Forced => write!(f, "forced"),
            Expectation::Terminates => write!(f, "any"),
            Expectation::SurvivesWindow(window) => {
                write!(f, "no exit within {:?}, then graceful", window)
            }
        }
    }
}
