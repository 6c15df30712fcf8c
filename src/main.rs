use anyhow::{Context, Result};
use clap::Parser;
use dvm::config::DEFAULT_CONFIG_FILE;
use dvm::lifecycle::EXIT_FAILURE;
use dvm::{ConfigOverrides, Daemon, DvmConfig};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "dvm")]
#[command(about = "Long-running daemon with signal-driven graceful shutdown")]
#[command(version)]
#[command(long_about = "Runs background work until asked to stop. SIGTERM/SIGINT begin a \
graceful drain bounded by the grace period, a second request forces an immediate exit, and \
SIGHUP reloads the configuration file. Status lines are written to stdout, logs to stderr.")]
#[command(args_override_self = true)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, help = "Path to TOML configuration file")]
    config: PathBuf,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the daemon")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Grace period for draining in-flight work
    #[arg(long, value_name = "MS")]
    grace_period_ms: Option<u64>,

    /// Number of background workers
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Duration of one unit of background work
    #[arg(long, value_name = "MS")]
    unit_duration_ms: Option<u64>,

    /// Control plane port (0 picks an ephemeral port)
    #[arg(long, value_name = "PORT")]
    control_port: Option<u16>,

    /// Do not serve the HTTP control plane
    #[arg(long)]
    no_control: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            grace_period_ms: self.grace_period_ms,
            workers: self.workers,
            unit_duration_ms: self.unit_duration_ms,
            control_port: self.control_port,
            disable_control: self.no_control,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let guard = init_logging(&args)?;

    let exit_code = match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!("dvm failed: {:#}", e);
            eprintln!("dvm: {:#}", e);
            EXIT_FAILURE
        }
    };

    info!("dvm exiting with code {}", exit_code);

    // process::exit skips destructors, flush buffered logs first
    drop(guard);
    std::process::exit(exit_code);
}

async fn run(args: &Args) -> Result<i32> {
    info!("Starting dvm v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config.display());

    let overrides = args.overrides();
    let mut config = DvmConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    overrides.apply(&mut config);

    if let Err(e) = config.validate() {
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
        }
        return Err(e).context("Invalid configuration");
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(0);
    }

    let mut daemon = Daemon::with_source(config, args.config.clone(), overrides);
    daemon.start().await.context("Failed to start daemon")?;

    let reason = daemon.run().await.context("Daemon stopped abnormally")?;
    Ok(reason.exit_code())
}

fn init_logging(args: &Args) -> Result<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dvm={}", log_level)));

    // stdout carries the status protocol, so logs never go there
    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path {} has no file name", path.display()))?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(args.log_file.is_none())
            .with_target(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(args.log_file.is_none())
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using compact", format);
            fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(args.log_file.is_none())
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# dvm configuration file");
    println!("# Every key is optional; environment variables override the file,");
    println!("# e.g. DVM_LIFECYCLE__GRACE_PERIOD_MS=2000");
    println!();
    println!("{}", DvmConfig::default().to_toml()?);
    Ok(())
}
