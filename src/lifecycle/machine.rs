use super::reload::ReloadHandler;
use super::signals::{SignalListener, SignalReceiver};
use super::state::StateCell;
use super::types::{Dispatch, IgnoreReason, ProcessState, SignalEvent, SignalKind, StopReason};
use crate::error::{DvmError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Counters kept for diagnostics; never consulted for transitions
#[derive(Debug, Clone, Default)]
pub struct SignalDiagnostics {
    pub dispatched: u64,
    pub reloads: u64,
    pub escalations: u64,
    pub ignored_after_stop: u64,
    pub last_event: Option<SignalEvent>,
}

/// In-process state machine driving startup, draining and stop
pub struct LifecycleCore {
    state: Arc<StateCell>,
    grace_period: Duration,
    admission: CancellationToken,
    work: TaskTracker,
    stop_reason: OnceLock<StopReason>,
    diagnostics: Mutex<SignalDiagnostics>,
    listener: Mutex<Option<SignalListener>>,
}

impl LifecycleCore {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            state: Arc::new(StateCell::new()),
            grace_period,
            admission: CancellationToken::new(),
            work: TaskTracker::new(),
            stop_reason: OnceLock::new(),
            diagnostics: Mutex::new(SignalDiagnostics::default()),
            listener: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason.get().copied()
    }

    pub fn diagnostics(&self) -> SignalDiagnostics {
        self.diagnostics.lock().clone()
    }

    pub fn work_gate(&self) -> WorkGate {
        WorkGate {
            state: Arc::clone(&self.state),
            tracker: self.work.clone(),
            admission: self.admission.clone(),
        }
    }

    /// Register interest in OS signals.
    ///
    /// Signals delivered from this point on are queued on the returned receiver,
    /// including those arriving before the daemon is marked ready.
    pub fn start(&self) -> Result<SignalReceiver> {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return Err(DvmError::system("Signal handlers already registered"));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        *listener = Some(SignalListener::register(sender)?);
        info!("Signal handlers registered");
        Ok(receiver)
    }

    /// Starting -> Ready, once initialization has completed
    pub fn mark_ready(&self) -> bool {
        let ready = self
            .state
            .transition(ProcessState::Starting, ProcessState::Ready);
        if ready {
            info!("Daemon is ready");
        } else {
            warn!(
                "Daemon could not become ready from state {}",
                self.state.get()
            );
        }
        ready
    }

    /// The single state-transition function.
    ///
    /// Runs under the state lock so workload threads deciding whether to
    /// accept new work never observe a half-applied transition.
    pub fn on_signal(&self, event: SignalEvent) -> Dispatch {
        let dispatch = self.state.update(|current| match (current, event.kind) {
            (ProcessState::Stopped, _) => (None, Dispatch::Ignored(IgnoreReason::AfterStop)),
            (_, SignalKind::Kill) => (None, Dispatch::Ignored(IgnoreReason::Uncatchable)),
            (ProcessState::Ready, SignalKind::HangupReload) => (None, Dispatch::Reload),
            (_, SignalKind::HangupReload) => (None, Dispatch::Ignored(IgnoreReason::NotReady)),
            (
                ProcessState::Starting | ProcessState::Ready,
                SignalKind::Interrupt | SignalKind::Terminate,
            ) => {
                self.admission.cancel();
                self.work.close();
                (Some(ProcessState::Draining), Dispatch::BeginDrain)
            }
            (ProcessState::Draining, SignalKind::Interrupt | SignalKind::Terminate) => {
                let _ = self.stop_reason.set(StopReason::Escalated(event.kind));
                (Some(ProcessState::Stopped), Dispatch::Escalate)
            }
        });

        let mut diagnostics = self.diagnostics.lock();
        diagnostics.last_event = Some(event);
        match dispatch {
            Dispatch::Ignored(IgnoreReason::AfterStop) => diagnostics.ignored_after_stop += 1,
            Dispatch::Ignored(_) => {}
            Dispatch::Reload => {
                diagnostics.dispatched += 1;
                diagnostics.reloads += 1;
            }
            Dispatch::Escalate => {
                diagnostics.dispatched += 1;
                diagnostics.escalations += 1;
            }
            Dispatch::BeginDrain => diagnostics.dispatched += 1,
        }
        drop(diagnostics);

        debug!("Dispatched {} -> {:?}", event.kind, dispatch);
        dispatch
    }

    /// Dispatch signals until shutdown completes.
    ///
    /// Reload requests are served in place; the first termination signal
    /// switches to the drain race.
    pub async fn run<H>(&self, signals: &mut SignalReceiver, reload: &H) -> Result<StopReason>
    where
        H: ReloadHandler + ?Sized,
    {
        while let Some(event) = signals.recv().await {
            match self.on_signal(event) {
                Dispatch::BeginDrain => {
                    info!(
                        "Shutdown requested by {}, draining for up to {:?}",
                        event.kind, self.grace_period
                    );
                    return Ok(self.drain(signals).await);
                }
                Dispatch::Escalate => {
                    return Ok(self
                        .stop_reason()
                        .unwrap_or(StopReason::Escalated(event.kind)));
                }
                Dispatch::Reload => {
                    info!("Reloading configuration");
                    if let Err(e) = reload.reload().await {
                        warn!("Configuration reload failed, keeping current settings: {}", e);
                    }
                }
                Dispatch::Ignored(reason) => {
                    debug!("Ignoring {} ({:?})", event.kind, reason);
                }
            }
        }

        Err(DvmError::system(
            "Signal channel closed before shutdown was requested",
        ))
    }

    /// Race work completion, the grace deadline and escalation.
    ///
    /// Escalation is polled first, so a second termination signal wins
    /// over a completion that becomes ready at the same time.
    pub async fn drain(&self, signals: &mut SignalReceiver) -> StopReason {
        let deadline = Instant::now() + self.grace_period;
        let mut signals_open = true;

        loop {
            tokio::select! {
                biased;

                event = signals.recv(), if signals_open => match event {
                    Some(event) => match self.on_signal(event) {
                        Dispatch::Escalate => {
                            warn!("Second {} received while draining, forcing stop", event.kind);
                            return self
                                .stop_reason()
                                .unwrap_or(StopReason::Escalated(event.kind));
                        }
                        other => debug!("Ignoring {} while draining ({:?})", event.kind, other),
                    },
                    None => signals_open = false,
                },
                _ = self.work.wait() => {
                    info!("In-flight work drained");
                    return self.finish(StopReason::Drained);
                }
                _ = sleep_until(deadline) => {
                    warn!(
                        "Grace period of {:?} expired with {} task(s) in flight",
                        self.grace_period,
                        self.work.len()
                    );
                    return self.finish(StopReason::GraceExpired);
                }
            }
        }
    }

    /// Count events still queued after stop without acting on them
    pub fn discard_pending(&self, signals: &mut SignalReceiver) -> usize {
        let mut discarded = 0;
        while let Ok(event) = signals.try_recv() {
            self.on_signal(event);
            discarded += 1;
        }
        discarded
    }

    fn finish(&self, reason: StopReason) -> StopReason {
        let stopped = self.state.update(|current| {
            if current == ProcessState::Draining {
                let _ = self.stop_reason.set(reason);
                (Some(ProcessState::Stopped), true)
            } else {
                (None, false)
            }
        });

        if stopped {
            info!("Stopped: {}", reason);
            reason
        } else {
            // Another edge already reached Stopped; keep the first outcome.
            self.stop_reason().unwrap_or(reason)
        }
    }
}

/// Admission handle shared with the workload.
///
/// Admission decisions are taken under the state lock, so no work is
/// registered once draining has begun.
#[derive(Clone)]
pub struct WorkGate {
    state: Arc<StateCell>,
    tracker: TaskTracker,
    admission: CancellationToken,
}

impl WorkGate {
    pub fn is_accepting(&self) -> bool {
        self.state.get().accepts_work()
    }

    pub fn state(&self) -> ProcessState {
        self.state.get()
    }

    /// Number of tracked tasks still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// True once draining has begun
    pub fn is_closed(&self) -> bool {
        self.admission.is_cancelled()
    }

    /// Resolves once admission of new work has stopped
    pub async fn closed(&self) {
        self.admission.cancelled().await
    }

    /// Spawn `work` as tracked in-flight work if the daemon is Ready
    pub fn admit<F>(&self, work: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.state
            .with_state(|state| state.accepts_work().then(|| self.tracker.spawn(work)))
    }

    /// Like [`WorkGate::admit`], but also accepted while Starting.
    /// Used for long-running workers launched during initialization.
    pub fn launch<F>(&self, work: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.state.with_state(|state| {
            matches!(state, ProcessState::Starting | ProcessState::Ready)
                .then(|| self.tracker.spawn(work))
        })
    }
}
