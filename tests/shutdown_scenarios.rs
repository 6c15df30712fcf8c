//! End-to-end shutdown behaviour of the real `dvm` binary, driven by the harness.

use dvm::error::{HarnessError, WaitPhase};
use dvm::harness::{Expectation, Scenario, ShutdownController, ShutdownOutcome};
use dvm::SignalKind;
use std::time::Duration;

const DVM: &str = env!("CARGO_BIN_EXE_dvm");

fn controller(grace_ms: u64, unit_ms: u64) -> ShutdownController {
    ShutdownController::new(DVM)
        .args([
            "--no-control".to_string(),
            "--config".to_string(),
            "dvm-integration-missing.toml".to_string(),
            "--grace-period-ms".to_string(),
            grace_ms.to_string(),
            "--unit-duration-ms".to_string(),
            unit_ms.to_string(),
        ])
        .ready_timeout(Duration::from_secs(15))
        .grace_bound(Duration::from_millis(grace_ms))
}

/// `None` when the platform cannot deliver the signal; those runs are skips
fn supported(result: Result<ShutdownOutcome, HarnessError>) -> Option<ShutdownOutcome> {
    match result {
        Err(e) if e.is_skip() => {
            eprintln!("skipping: {}", e);
            None
        }
        other => Some(other.unwrap()),
    }
}

#[tokio::test]
async fn terminate_once_drains_cleanly() {
    let result = controller(5_000, 200)
        .run_scenario(SignalKind::Terminate, true, Duration::from_secs(10))
        .await;
    let Some(outcome) = supported(result) else { return };

    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.graceful);
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn interrupt_once_drains_cleanly() {
    let result = controller(5_000, 200)
        .run_scenario(SignalKind::Interrupt, true, Duration::from_secs(10))
        .await;
    let Some(outcome) = supported(result) else { return };

    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.graceful);
}

#[tokio::test]
async fn second_terminate_escalates() {
    let scenario = Scenario::new(
        "double-terminate",
        vec![SignalKind::Terminate, SignalKind::Terminate],
    )
    .interval(Duration::from_millis(50))
    .expect(Expectation::Forced)
    .timeout(Duration::from_secs(5));

    let result = controller(5_000, 20_000).run(&scenario).await;
    let Some(outcome) = supported(result) else { return };

    assert_eq!(outcome.exit_code, Some(143));
    assert!(!outcome.graceful);
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn second_interrupt_escalates() {
    let scenario = Scenario::new(
        "double-interrupt",
        vec![SignalKind::Interrupt, SignalKind::Interrupt],
    )
    .expect(Expectation::Forced)
    .timeout(Duration::from_secs(5));

    let result = controller(5_000, 20_000).run(&scenario).await;
    let Some(outcome) = supported(result) else { return };

    assert_eq!(outcome.exit_code, Some(130));
}

#[tokio::test]
async fn hangup_keeps_daemon_running() {
    let scenario = Scenario::new("hangup", vec![SignalKind::HangupReload])
        .expect(Expectation::SurvivesWindow(Duration::from_secs(2)))
        .timeout(Duration::from_secs(10));

    let result = controller(2_000, 200).run(&scenario).await;
    let Some(outcome) = supported(result) else { return };

    // The cleanup terminate after the window drains normally
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn grace_expiry_forces_exit() {
    let result = controller(300, 10_000)
        .run_scenario(SignalKind::Terminate, false, Duration::from_secs(5))
        .await;
    let Some(outcome) = supported(result) else { return };

    assert_eq!(outcome.exit_code, Some(3));
    assert!(outcome.elapsed >= Duration::from_millis(300));
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn terminate_before_ready_never_hangs() {
    let scenario = Scenario::new("early-terminate", vec![SignalKind::Terminate])
        .before_ready()
        .expect(Expectation::Terminates)
        .timeout(Duration::from_secs(10));

    let result = controller(1_000, 100).run(&scenario).await;
    let Some(outcome) = supported(result) else { return };

    // Either the default disposition killed it or the queued request drained it
    assert!(outcome.exit_code == Some(0) || outcome.terminating_signal.is_some());
}

#[tokio::test]
async fn kill_is_forced() {
    let outcome = controller(5_000, 200)
        .run_scenario(SignalKind::Kill, false, Duration::from_secs(10))
        .await
        .unwrap();

    assert!(!outcome.graceful);
    #[cfg(unix)]
    assert_eq!(outcome.terminating_signal, Some(9));
}

#[tokio::test]
async fn missing_binary_is_spawn_failure() {
    let err = ShutdownController::new("/nonexistent/dvm")
        .run_scenario(SignalKind::Terminate, true, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::SpawnFailure { .. }));
}

#[tokio::test]
async fn invalid_configuration_exits_before_ready() {
    let err = ShutdownController::new(DVM)
        .args(["--no-control", "--workers", "0"])
        .run_scenario(SignalKind::Terminate, true, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::SpawnFailure { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn status_lines_track_the_lifecycle() {
    let controller = controller(5_000, 100);
    let mut daemon = controller.spawn(&[]).unwrap();

    let ready = daemon.wait_ready(Duration::from_secs(15)).await.unwrap();
    assert_eq!(Some(ready.pid), daemon.id());
    assert_eq!(ready.control, None);

    daemon.signal(SignalKind::Terminate).unwrap();
    let outcome = daemon
        .await_exit(
            Duration::from_secs(10),
            tokio::time::Instant::now(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(outcome.exit_code, Some(0));

    // The reader may still be consuming the final lines
    let mut stopped = None;
    for _ in 0..50 {
        stopped = daemon.observed().stopped;
        if stopped.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stopped, Some(("drained".to_string(), 0)));
}

#[cfg(unix)]
#[tokio::test]
async fn readiness_timeout_reports_phase() {
    let err = ShutdownController::new("/bin/sh")
        .args(["-c", "exec sleep 30"])
        .ready_timeout(Duration::from_millis(200))
        .run_scenario(SignalKind::Terminate, true, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Timeout {
            phase: WaitPhase::Readiness,
            ..
        }
    ));
}

#[cfg(feature = "http")]
#[tokio::test]
async fn control_plane_reports_health_while_ready() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let controller = ShutdownController::new(DVM).args([
        "--control-port",
        "0",
        "--config",
        "dvm-integration-missing.toml",
    ]);
    let mut daemon = controller.spawn(&[]).unwrap();
    let ready = daemon.wait_ready(Duration::from_secs(15)).await.unwrap();
    let address = ready.control.expect("control plane address");

    let mut stream = tokio::net::TcpStream::connect(&address).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains("\"ready\""));

    daemon.kill().await;
}
