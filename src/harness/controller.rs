use super::outcome::{Expectation, ShutdownOutcome};
use super::platform::{self, Delivery, SignalCapabilities};
use super::scenario::Scenario;
use crate::error::{HarnessError, WaitPhase};
use crate::lifecycle::{ProcessState, SignalKind};
use crate::status::StatusLine;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GRACE_BOUND: Duration = Duration::from_secs(5);

/// Launches the daemon as a child process, drives it with signals and
/// classifies how it terminated
#[derive(Debug, Clone)]
pub struct ShutdownController {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    ready_timeout: Duration,
    grace_bound: Duration,
    capabilities: SignalCapabilities,
    inherit_stderr: bool,
}

impl ShutdownController {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            grace_bound: DEFAULT_GRACE_BOUND,
            capabilities: SignalCapabilities::current(),
            inherit_stderr: false,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Exits slower than this are classified as forced even with code 0
    pub fn grace_bound(mut self, grace_bound: Duration) -> Self {
        self.grace_bound = grace_bound;
        self
    }

    pub fn capabilities(mut self, capabilities: SignalCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Pass the daemon's log output through instead of discarding it
    pub fn inherit_stderr(mut self, inherit: bool) -> Self {
        self.inherit_stderr = inherit;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn platform(&self) -> &SignalCapabilities {
        &self.capabilities
    }

    /// Launch the daemon, wait for readiness, deliver one signal and wait for
    /// exit within `timeout`
    pub async fn run_scenario(
        &self,
        kind: SignalKind,
        expect_graceful: bool,
        timeout: Duration,
    ) -> Result<ShutdownOutcome, HarnessError> {
        let scenario = Scenario::new(kind.as_str(), vec![kind])
            .expect(Expectation::from_graceful(expect_graceful))
            .timeout(timeout);
        self.run(&scenario).await
    }

    pub async fn run(&self, scenario: &Scenario) -> Result<ShutdownOutcome, HarnessError> {
        self.capabilities.check(&scenario.required_signals())?;

        info!("Running scenario '{}'", scenario.name);
        let mut daemon = self.spawn(&scenario.daemon_args)?;

        if scenario.wait_for_ready {
            daemon.wait_ready(self.ready_timeout).await?;
        }

        let started = Instant::now();
        for (index, kind) in scenario.signals.iter().enumerate() {
            if index > 0 && !scenario.interval.is_zero() {
                sleep(scenario.interval).await;
            }
            if daemon.signal(*kind)? == Delivery::AlreadyExited {
                break;
            }
        }

        if let Expectation::SurvivesWindow(window) = scenario.expect {
            if let Some(status) = daemon.wait_within(window).await? {
                let outcome = ShutdownOutcome::classify(status, started.elapsed(), self.grace_bound);
                return Err(HarnessError::UnexpectedExitCode {
                    expected: scenario.expect,
                    outcome,
                });
            }

            debug!("Daemon survived {:?}, requesting shutdown", window);
            let cleanup_started = Instant::now();
            daemon.signal(SignalKind::Terminate)?;
            let outcome = daemon
                .await_exit(scenario.timeout, cleanup_started, self.grace_bound)
                .await?;
            return scenario.expect.verify(outcome);
        }

        let outcome = daemon
            .await_exit(scenario.timeout, started, self.grace_bound)
            .await?;
        scenario.expect.verify(outcome)
    }

    /// Spawn the daemon in its own process group with stdout captured
    pub fn spawn(&self, extra_args: &[String]) -> Result<DaemonProcess, HarnessError> {
        let program = self.program.display().to_string();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(extra_args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| HarnessError::spawn_failure(program.clone(), e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::spawn_failure(program.clone(), "stdout not captured"))?;

        let (observed_tx, observed) = watch::channel(ObservedStatus::default());
        let reader = tokio::spawn(read_status(stdout, observed_tx));

        debug!("Spawned {} as pid {:?}", program, child.id());
        Ok(DaemonProcess {
            child,
            program,
            observed,
            reader,
        })
    }
}

/// What the status reader has seen on the daemon's stdout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedStatus {
    pub ready: Option<ReadyInfo>,
    pub last_state: Option<ProcessState>,
    pub stopped: Option<(String, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyInfo {
    pub pid: u32,
    pub control: Option<String>,
}

impl ObservedStatus {
    fn record(&mut self, line: StatusLine) {
        self.last_state = Some(line.state());
        match line {
            StatusLine::Ready { pid, control } => self.ready = Some(ReadyInfo { pid, control }),
            StatusLine::Stopped { reason, code } => self.stopped = Some((reason, code)),
            StatusLine::State(_) => {}
        }
    }
}

async fn read_status(stdout: ChildStdout, observed: watch::Sender<ObservedStatus>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.parse::<StatusLine>() {
                Ok(status) => {
                    debug!("Daemon reported: {}", status);
                    observed.send_modify(|o| o.record(status));
                }
                Err(_) => debug!("Ignoring daemon output: {}", line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed reading daemon stdout: {}", e);
                break;
            }
        }
    }
}

/// A running daemon under the controller's supervision
pub struct DaemonProcess {
    child: Child,
    program: String,
    observed: watch::Receiver<ObservedStatus>,
    reader: JoinHandle<()>,
}

impl DaemonProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn observed(&self) -> ObservedStatus {
        self.observed.borrow().clone()
    }

    pub fn last_state(&self) -> Option<ProcessState> {
        self.observed.borrow().last_state
    }

    /// Wait for the ready line. Exiting first is a spawn failure.
    pub async fn wait_ready(&mut self, within: Duration) -> Result<ReadyInfo, HarnessError> {
        let started = Instant::now();
        let deadline = started + within;
        let mut observed = self.observed.clone();
        let mut stdout_open = true;

        loop {
            if let Some(ready) = observed.borrow_and_update().ready.clone() {
                debug!("Daemon ready after {:?}", started.elapsed());
                return Ok(ready);
            }

            tokio::select! {
                changed = observed.changed(), if stdout_open => {
                    if changed.is_err() {
                        stdout_open = false;
                    }
                }
                status = self.child.wait() => {
                    let reason = match status {
                        Ok(status) => format!("exited before becoming ready ({})", status),
                        Err(e) => format!("lost track of process before readiness: {}", e),
                    };
                    return Err(HarnessError::spawn_failure(self.program.clone(), reason));
                }
                _ = sleep_until(deadline) => {
                    return Err(HarnessError::Timeout {
                        phase: WaitPhase::Readiness,
                        elapsed: started.elapsed(),
                        last_state: self.observed.borrow().last_state,
                    });
                }
            }
        }
    }

    pub fn signal(&mut self, kind: SignalKind) -> Result<Delivery, HarnessError> {
        platform::deliver(&mut self.child, kind)
    }

    /// `Some(status)` if the daemon exits within `window`
    pub async fn wait_within(&mut self, window: Duration) -> Result<Option<ExitStatus>, HarnessError> {
        match timeout(window, self.child.wait()).await {
            Ok(status) => Ok(Some(status?)),
            Err(_) => Ok(None),
        }
    }

    /// Wait for exit; on timeout the daemon is killed and reaped
    pub async fn await_exit(
        &mut self,
        within: Duration,
        started: Instant,
        grace_bound: Duration,
    ) -> Result<ShutdownOutcome, HarnessError> {
        match timeout(within, self.child.wait()).await {
            Ok(status) => {
                let outcome = ShutdownOutcome::classify(status?, started.elapsed(), grace_bound);
                info!("Daemon terminated: {}", outcome);
                Ok(outcome)
            }
            Err(_) => {
                let elapsed = started.elapsed();
                let last_state = self.last_state();
                warn!(
                    "Daemon did not exit within {:?} (last state {:?}), killing it",
                    within, last_state
                );
                self.kill().await;
                Err(HarnessError::Timeout {
                    phase: WaitPhase::Exit,
                    elapsed,
                    last_state,
                })
            }
        }
    }

    /// Force-terminate and reap so no orphan outlives the scenario
    pub async fn kill(&mut self) {
        if let Err(e) = self.signal(SignalKind::Kill) {
            debug!("Group kill failed ({}), killing child directly", e);
        }
        if let Err(e) = self.child.kill().await {
            debug!("Child already reaped: {}", e);
        }
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
