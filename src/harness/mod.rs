//! External shutdown harness.
//!
//! Launches the daemon as a child process, waits for its ready line,
//! delivers signal sequences and checks how it terminated. Used by the
//! `shutdown-check` binary and the integration tests.

mod controller;
mod outcome;
mod platform;
mod scenario;

pub use controller::{DaemonProcess, ObservedStatus, ReadyInfo, ShutdownController};
pub use outcome::{Expectation, ShutdownOutcome};
pub use platform::{deliver, Delivery, SignalCapabilities};
pub use scenario::{
    run_suite, standard_scenarios, Scenario, ScenarioReport, ScenarioStatus, SuiteReport,
};
