//! Per-platform signal capabilities and delivery.
//!
//! POSIX targets can deliver every [`SignalKind`] to the daemon's process
//! group. Windows has no way to send a console control event to a single
//! child without sharing its console, so only `Kill` (TerminateProcess) is
//! available there and scenarios using other kinds are skipped.

use crate::error::HarnessError;
use crate::lifecycle::SignalKind;
use tokio::process::Child;
use tracing::debug;

/// Result of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The target had already exited; not an error for escalation sequences
    AlreadyExited,
}

/// The set of signal kinds the harness can deliver on a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalCapabilities {
    os: &'static str,
    supported: &'static [SignalKind],
}

impl SignalCapabilities {
    #[cfg(unix)]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            supported: &SignalKind::ALL,
        }
    }

    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            supported: &[SignalKind::Kill],
        }
    }

    pub fn new(os: &'static str, supported: &'static [SignalKind]) -> Self {
        Self { os, supported }
    }

    pub fn os(&self) -> &'static str {
        self.os
    }

    pub fn supports(&self, kind: SignalKind) -> bool {
        self.supported.contains(&kind)
    }

    /// Fails with `SignalUnsupported` for the first kind this platform lacks
    pub fn check(&self, kinds: &[SignalKind]) -> Result<(), HarnessError> {
        match kinds.iter().find(|kind| !self.supports(**kind)) {
            Some(kind) => Err(HarnessError::SignalUnsupported {
                kind: *kind,
                os: self.os,
            }),
            None => Ok(()),
        }
    }
}

/// Deliver `kind` to the child's process group
#[cfg(unix)]
pub fn deliver(child: &mut Child, kind: SignalKind) -> Result<Delivery, HarnessError> {
    let Some(pid) = child.id() else {
        return Ok(Delivery::AlreadyExited);
    };

    let signum = match kind {
        SignalKind::Interrupt => libc::SIGINT,
        SignalKind::Terminate => libc::SIGTERM,
        SignalKind::HangupReload => libc::SIGHUP,
        SignalKind::Kill => libc::SIGKILL,
    };

    // The child leads its own process group, so the negated pid addresses the group.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signum) };
    if rc == 0 {
        debug!("Delivered {} to process group {}", kind, pid);
        return Ok(Delivery::Delivered);
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        debug!("Process group {} already gone, {} not delivered", pid, kind);
        Ok(Delivery::AlreadyExited)
    } else {
        Err(HarnessError::SignalDelivery { kind, source: err })
    }
}

#[cfg(not(unix))]
pub fn deliver(child: &mut Child, kind: SignalKind) -> Result<Delivery, HarnessError> {
    match kind {
        SignalKind::Kill => {
            if child.id().is_none() {
                return Ok(Delivery::AlreadyExited);
            }
            child
                .start_kill()
                .map_err(|source| HarnessError::SignalDelivery { kind, source })?;
            debug!("Terminated child process");
            Ok(Delivery::Delivered)
        }
        other => Err(HarnessError::SignalUnsupported {
            kind: other,
            os: std::env::consts::OS,
        }),
    }
}
