//! Line-oriented status protocol written by the daemon on stdout.
//!
//! Logs go to stderr, so every stdout line starting with `dvm: ` is a status
//! line. Supervisors (the shutdown harness among them) read these to learn
//! when the daemon is ready and which state it last reported.
//!
//! ```text
//! dvm: ready pid=4242 control=127.0.0.1:50051
//! dvm: state draining
//! dvm: stopped reason=drained code=0
//! ```

use crate::lifecycle::{ProcessState, StopReason};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

const PREFIX: &str = "dvm: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Ready { pid: u32, control: Option<String> },
    State(ProcessState),
    Stopped { reason: String, code: i32 },
}

impl StatusLine {
    pub fn stopped(reason: StopReason) -> Self {
        StatusLine::Stopped {
            reason: reason.label(),
            code: reason.exit_code(),
        }
    }

    /// The state implied by this line
    pub fn state(&self) -> ProcessState {
        match self {
            StatusLine::Ready { .. } => ProcessState::Ready,
            StatusLine::State(state) => *state,
            StatusLine::Stopped { .. } => ProcessState::Stopped,
        }
    }

    /// Write the line to stdout and flush, so readers never wait on buffering
    pub fn emit(&self) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", self)?;
        handle.flush()
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::Ready { pid, control } => write!(
                f,
                "{}ready pid={} control={}",
                PREFIX,
                pid,
                control.as_deref().unwrap_or("none")
            ),
            StatusLine::State(state) => write!(f, "{}state {}", PREFIX, state),
            StatusLine::Stopped { reason, code } => {
                write!(f, "{}stopped reason={} code={}", PREFIX, reason, code)
            }
        }
    }
}

impl FromStr for StatusLine {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let body = line
            .trim_end()
            .strip_prefix(PREFIX)
            .ok_or_else(|| format!("not a status line: '{}'", line))?;

        let mut parts = body.split_whitespace();
        let verb = parts.next().ok_or("empty status line")?;

        match verb {
            "ready" => {
                let mut pid = None;
                let mut control = None;
                for (key, value) in parts.filter_map(|p| p.split_once('=')) {
                    match key {
                        "pid" => pid = value.parse::<u32>().ok(),
                        "control" if value != "none" => control = Some(value.to_string()),
                        _ => {}
                    }
                }
                Ok(StatusLine::Ready {
                    pid: pid.ok_or("ready line without pid")?,
                    control,
                })
            }
            "state" => {
                let state = parts.next().ok_or("state line without state")?;
                Ok(StatusLine::State(state.parse()?))
            }
            "stopped" => {
                let mut reason = None;
                let mut code = None;
                for (key, value) in parts.filter_map(|p| p.split_once('=')) {
                    match key {
                        "reason" => reason = Some(value.to_string()),
                        "code" => code = value.parse::<i32>().ok(),
                        _ => {}
                    }
                }
                Ok(StatusLine::Stopped {
                    reason: reason.ok_or("stopped line without reason")?,
                    code: code.ok_or("stopped line without code")?,
                })
            }
            other => Err(format!("unknown status verb '{}'", other)),
        }
    }
}
