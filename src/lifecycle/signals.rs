//! OS signal registration.
//!
//! Signal interest is process-wide: it is registered once when the daemon
//! starts and is torn down implicitly when the process exits. Each delivery
//! is turned into a [`SignalEvent`] and forwarded to the lifecycle core
//! through an unbounded channel, so delivery order is preserved and nothing
//! blocks inside the listener.
//!
//! ## Unix
//! - **SIGINT** → `Interrupt`
//! - **SIGTERM** → `Terminate`
//! - **SIGHUP** → `HangupReload`
//!
//! ## Windows
//! - Ctrl-C → `Interrupt`
//! - Ctrl-Break, console close and system shutdown → `Terminate`

use super::types::SignalEvent;
#[cfg(any(unix, windows))]
use super::types::SignalKind;
use crate::error::Result;
#[cfg(any(unix, windows))]
use crate::error::DvmError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
#[cfg(any(unix, windows))]
use tracing::info;

/// Receiving end handed to the lifecycle run loop
pub type SignalReceiver = mpsc::UnboundedReceiver<SignalEvent>;

/// Background tasks forwarding OS signals into the lifecycle channel
pub struct SignalListener {
    tasks: Vec<JoinHandle<()>>,
}

impl SignalListener {
    /// Register signal interest and start forwarding into `sender`
    #[cfg(unix)]
    pub fn register(sender: mpsc::UnboundedSender<SignalEvent>) -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind as UnixSignalKind};

        let registrations = [
            (SignalKind::Interrupt, UnixSignalKind::interrupt()),
            (SignalKind::Terminate, UnixSignalKind::terminate()),
            (SignalKind::HangupReload, UnixSignalKind::hangup()),
        ];

        let mut tasks = Vec::with_capacity(registrations.len());
        for (kind, unix_kind) in registrations {
            let mut stream =
                signal(unix_kind).map_err(|source| DvmError::SignalRegistration { kind, source })?;
            let sender = sender.clone();
            tasks.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!("Received {} signal", kind);
                    if sender.send(SignalEvent::new(kind)).is_err() {
                        break;
                    }
                }
            }));
        }

        Ok(Self { tasks })
    }

    #[cfg(windows)]
    pub fn register(sender: mpsc::UnboundedSender<SignalEvent>) -> Result<Self> {
        use tokio::signal::windows;

        let mut ctrl_c = windows::ctrl_c().map_err(|source| DvmError::SignalRegistration {
            kind: SignalKind::Interrupt,
            source,
        })?;
        let mut ctrl_break = windows::ctrl_break().map_err(|source| {
            DvmError::SignalRegistration {
                kind: SignalKind::Terminate,
                source,
            }
        })?;
        let mut ctrl_close = windows::ctrl_close().map_err(|source| {
            DvmError::SignalRegistration {
                kind: SignalKind::Terminate,
                source,
            }
        })?;
        let mut ctrl_shutdown = windows::ctrl_shutdown().map_err(|source| {
            DvmError::SignalRegistration {
                kind: SignalKind::Terminate,
                source,
            }
        })?;

        let task = tokio::spawn(async move {
            loop {
                let kind = tokio::select! {
                    Some(()) = ctrl_c.recv() => SignalKind::Interrupt,
                    Some(()) = ctrl_break.recv() => SignalKind::Terminate,
                    Some(()) = ctrl_close.recv() => SignalKind::Terminate,
                    Some(()) = ctrl_shutdown.recv() => SignalKind::Terminate,
                    else => break,
                };
                info!("Received {} console event", kind);
                if sender.send(SignalEvent::new(kind)).is_err() {
                    break;
                }
            }
        });

        Ok(Self { tasks: vec![task] })
    }

    #[cfg(not(any(unix, windows)))]
    pub fn register(_sender: mpsc::UnboundedSender<SignalEvent>) -> Result<Self> {
        Ok(Self { tasks: Vec::new() })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
