use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use instrument_common::{LogFormat, LoggingConfig, StoreClient, init_tracing};
use snmp_hoststats::scheduler::{RunExit, Scheduler, SchedulerOptions};
use snmp_hoststats::watch::{ExecutableWatch, reexec};
use snmp_hoststats::{ConfigStore, HostPoller, SnmpSession};

/// How long in-flight polls may finish after the scheduler stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Poll SNMP hosts and store their statistics in an OpenInstrument datastore.
#[derive(Parser, Debug)]
#[command(name = "snmp-hoststats")]
#[command(about = "Poll SNMP host statistics into an OpenInstrument datastore", long_about = None)]
struct Args {
    /// Path to the host list (INI format).
    #[arg(short, long, default_value = "snmp_hoststats.cfg")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format: text or json.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Maximum number of hosts polled concurrently.
    #[arg(long, default_value_t = 8)]
    workers: usize,
}

fn srchost() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot determine local hostname");
            "localhost".to_string()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&LoggingConfig {
        level: args.log_level.clone(),
        format: args.log_format,
    })
    .context("Failed to initialize tracing")?;

    let config = ConfigStore::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let srchost = srchost();
    tracing::info!(
        config = ?args.config,
        hosts = config.snapshot().len(),
        srchost = %srchost,
        version = env!("CARGO_PKG_VERSION"),
        "Starting snmp-hoststats"
    );

    let store = StoreClient::new().context("Failed to create datastore client")?;
    let poller = Arc::new(HostPoller::new(SnmpSession::new(), store, srchost));

    let mut scheduler = Scheduler::new(
        config,
        poller,
        SchedulerOptions {
            workers: args.workers,
            ..Default::default()
        },
    );
    match ExecutableWatch::current() {
        Ok(watch) => scheduler = scheduler.with_executable_watch(watch),
        Err(e) => tracing::warn!(error = %e, "Cannot watch executable, automatic restart disabled"),
    }

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let exit = scheduler.run(shutdown).await;
    tracing::info!("Shutting down...");
    scheduler.drain(SHUTDOWN_GRACE).await;

    if let RunExit::ExecutableChanged(path) = exit {
        // Only returns if exec failed.
        let e = reexec(&path);
        return Err(e).with_context(|| format!("Failed to re-execute {}", path.display()));
    }

    tracing::info!("Goodbye!");
    Ok(())
}
