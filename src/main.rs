use anyhow::{Context, Result};
use clap::Parser;
use simctl::{ControlChannel, ControlMessage, DelayDrainer, Driver, SimctlConfig};
use std::sync::Arc;
use tokio::io::{self, BufReader};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "simctl")]
#[command(about = "Lifecycle control channel for running simulations")]
#[command(version)]
#[command(long_about = "Reads newline-delimited JSON control messages (start, pause, shutdown), \
applies them to the simulation lifecycle one at a time, and writes one JSON reply per message. \
SIGINT and SIGTERM shut a running simulation down and wait for it to drain.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "simctl.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Read control messages from a file instead of stdin
    #[arg(short, long, value_name = "FILE")]
    input: Option<String>,

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
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Print the canonical control messages and exit
    #[arg(long, help = "Print the start, shutdown and pause messages and exit")]
    print_messages: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    if args.print_messages {
        print_messages();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting simctl v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = SimctlConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let drainer = Arc::new(DelayDrainer::new(config.drain.simulated_drain()));
    let channel = ControlChannel::new(config, drainer).map_err(|e| {
        error!("Failed to create control channel: {}", e);
        e
    })?;
    let driver = Driver::new(channel);

    let exit_code = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input file {}", path))?;
            driver.run(BufReader::new(file), io::stdout()).await?
        }
        None => driver.run(BufReader::new(io::stdin()), io::stdout()).await?,
    };

    info!("simctl exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
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
        .unwrap_or_else(|_| EnvFilter::new(format!("simctl={}", log_level)));

    // Replies go to stdout, so logs go to stderr
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# simctl configuration file");
    println!("# Every option is shown with its default value.");
    println!("# Environment variables override it, e.g. SIMCTL_CHANNEL__LOCK_TIMEOUT_MS=500");
    println!();
    println!("{}", SimctlConfig::default().to_toml()?);
    Ok(())
}

/// Print the three control messages web clients send
fn print_messages() {
    for message in [
        ControlMessage::start(),
        ControlMessage::shutdown(),
        ControlMessage::pause(),
    ] {
        println!("{}", message.to_wire_string());
    }
}
