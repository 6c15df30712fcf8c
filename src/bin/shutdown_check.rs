use anyhow::{bail, Context, Result};
use clap::Parser;
use dvm::harness::{
    run_suite, standard_scenarios, ScenarioStatus, ShutdownController, SuiteReport,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Drive a dvm binary through the standard shutdown scenarios
#[derive(Parser, Debug)]
#[command(name = "shutdown-check")]
#[command(about = "Verify that a dvm binary shuts down gracefully under every supported signal")]
struct Args {
    /// Path to the dvm binary under test
    #[arg(long, default_value = "dvm")]
    daemon: PathBuf,

    /// Grace period the daemon is launched with
    #[arg(long, default_value_t = 2_000)]
    grace_ms: u64,

    /// Unit duration the daemon is launched with; must be well below the grace period
    #[arg(long, default_value_t = 500)]
    unit_ms: u64,

    /// How long to wait for the ready line
    #[arg(long, default_value_t = 10_000)]
    ready_timeout_ms: u64,

    /// Only run scenarios whose name contains this string
    #[arg(long)]
    only: Option<String>,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,

    /// Show the daemon's log output
    #[arg(long)]
    daemon_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    if args.unit_ms >= args.grace_ms {
        bail!(
            "--unit-ms ({}) must be shorter than --grace-ms ({})",
            args.unit_ms,
            args.grace_ms
        );
    }

    let grace = Duration::from_millis(args.grace_ms);
    let controller = ShutdownController::new(&args.daemon)
        .args([
            "--no-control".to_string(),
            "--grace-period-ms".to_string(),
            args.grace_ms.to_string(),
            "--unit-duration-ms".to_string(),
            args.unit_ms.to_string(),
        ])
        .ready_timeout(Duration::from_millis(args.ready_timeout_ms))
        .grace_bound(grace)
        .inherit_stderr(args.daemon_logs);

    let scenarios: Vec<_> = standard_scenarios(grace)
        .into_iter()
        .filter(|s| args.only.as_deref().map_or(true, |only| s.name.contains(only)))
        .collect();

    info!(
        "Running {} scenario(s) against {} on {}",
        scenarios.len(),
        args.daemon.display(),
        controller.platform().os()
    );

    let report = run_suite(&controller, &scenarios).await;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_report(&report);
    }

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &SuiteReport) {
    for scenario in &report.scenarios {
        match &scenario.status {
            ScenarioStatus::Passed { outcome } => println!("✓ {:<24} {}", scenario.name, outcome),
            ScenarioStatus::Skipped { reason } => println!("- {:<24} skipped: {}", scenario.name, reason),
            ScenarioStatus::Failed { error } => println!("✗ {:<24} {}", scenario.name, error),
        }
    }
    println!(
        "\n{} passed, {} skipped, {} failed on {}",
        report.passed(),
        report.skipped(),
        report.failed(),
        report.os
    );
}
