use super::controller::ShutdownController;
use super::outcome::{Expectation, ShutdownOutcome};
use crate::lifecycle::SignalKind;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A signal sequence delivered to a freshly launched daemon, plus the
/// classification the run must produce
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub signals: Vec<SignalKind>,
    /// Delay between consecutive signals
    pub interval: Duration,
    pub wait_for_ready: bool,
    pub expect: Expectation,
    pub timeout: Duration,
    /// Appended to the controller's arguments for this run only
    pub daemon_args: Vec<String>,
}

impl Scenario {
    pub fn new<S: Into<String>>(name: S, signals: Vec<SignalKind>) -> Self {
        Self {
            name: name.into(),
            signals,
            interval: DEFAULT_INTERVAL,
            wait_for_ready: true,
            expect: Expectation::Graceful,
            timeout: DEFAULT_TIMEOUT,
            daemon_args: Vec::new(),
        }
    }

    pub fn expect(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Deliver the signals right after spawning instead of after readiness
    pub fn before_ready(mut self) -> Self {
        self.wait_for_ready = false;
        self
    }

    pub fn daemon_arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.daemon_args.push(arg.into());
        self
    }

    /// Launch the daemon with work units far longer than `grace`, so work is
    /// still in flight whenever a signal lands
    pub fn outlasting(self, grace: Duration) -> Self {
        let unit_ms = grace.as_millis() as u64 * 4;
        self.daemon_arg("--unit-duration-ms")
            .daemon_arg(unit_ms.to_string())
    }

    /// Every kind the run may deliver, including the cleanup Terminate
    /// sent after a survival window
    pub fn required_signals(&self) -> Vec<SignalKind> {
        let mut kinds = self.signals.clone();
        if matches!(self.expect, Expectation::SurvivesWindow(_))
            && !kinds.contains(&SignalKind::Terminate)
        {
            kinds.push(SignalKind::Terminate);
        }
        kinds
    }
}

/// The standard shutdown matrix for a daemon configured with `grace`.
///
/// The daemon must be launched with a unit duration comfortably shorter than
/// `grace`; scenarios that need work outlasting the grace period override it.
pub fn standard_scenarios(grace: Duration) -> Vec<Scenario> {
    let exit_budget = grace * 2;

    vec![
        Scenario::new("terminate-graceful", vec![SignalKind::Terminate]).timeout(exit_budget),
        Scenario::new("interrupt-graceful", vec![SignalKind::Interrupt]).timeout(exit_budget),
        // A forced exit after a second request has to beat the grace period
        Scenario::new(
            "terminate-escalation",
            vec![SignalKind::Terminate, SignalKind::Terminate],
        )
        .outlasting(grace)
        .expect(Expectation::Forced)
        .timeout(grace),
        Scenario::new(
            "interrupt-escalation",
            vec![SignalKind::Interrupt, SignalKind::Interrupt],
        )
        .outlasting(grace)
        .expect(Expectation::Forced)
        .timeout(grace),
        Scenario::new("hangup-survives", vec![SignalKind::HangupReload])
            .expect(Expectation::SurvivesWindow(grace))
            .timeout(exit_budget),
        Scenario::new("terminate-before-ready", vec![SignalKind::Terminate])
            .before_ready()
            .expect(Expectation::Terminates)
            .timeout(exit_budget),
        Scenario::new("kill-forced", vec![SignalKind::Kill])
            .expect(Expectation::Forced)
            .timeout(exit_budget),
        Scenario::new("grace-expiry", vec![SignalKind::Terminate])
            .outlasting(grace)
            .expect(Expectation::Forced)
            .timeout(exit_budget),
    ]
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed { outcome: ShutdownOutcome },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    #[serde(flatten)]
    pub status: ScenarioStatus,
}

impl ScenarioReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ScenarioStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub os: &'static str,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Passed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&ScenarioStatus) -> bool) -> usize {
        self.scenarios.iter().filter(|r| predicate(&r.status)).count()
    }
}

/// Run scenarios one after another, each against a fresh daemon
pub async fn run_suite(controller: &ShutdownController, scenarios: &[Scenario]) -> SuiteReport {
    let mut reports = Vec::with_capacity(scenarios.len());

    for scenario in scenarios {
        let status = match controller.run(scenario).await {
            Ok(outcome) => {
                info!("Scenario '{}' passed: {}", scenario.name, outcome);
                ScenarioStatus::Passed { outcome }
            }
            Err(e) if e.is_skip() => {
                info!("Scenario '{}' skipped: {}", scenario.name, e);
                ScenarioStatus::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!("Scenario '{}' failed: {}", scenario.name, e);
                ScenarioStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        reports.push(ScenarioReport {
            name: scenario.name.clone(),
            status,
        });
    }

    SuiteReport {
        os: controller.platform().os(),
        scenarios: reports,
    }
}
