//! geotrack daemon: runs the tracking service against the simulated
//! provider and logs every fix it produces.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gt_core::config::{Config, LogFormat};
use gt_daemon::daemon::Daemon;
use gt_daemon::environment;
use gt_daemon::fix_stream::{FixSubscription, StreamEvent};
use gt_daemon::host::HostSignal;
use gt_daemon::provider::SimulatedProvider;
use tracing::{debug, error, info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// geotrack -- resilient background location tracking.
#[derive(Parser)]
#[command(name = "geotrack", version, about)]
struct Cli {
    /// Config file (default: ~/.geotrack/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `general.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Treat this launch as the device finishing boot.
    #[arg(long)]
    boot: bool,

    /// Start tracking as a manual user action on launch.
    #[arg(long)]
    start: bool,

    /// Emit JSON logs regardless of `general.log_format`.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_file = environment::configure_app();

    let mut config = load_config(cli.config.clone())?;
    if let Some(dir) = &cli.data_dir {
        config.general.data_dir = dir.display().to_string();
    }
    if cli.json_logs {
        config.general.log_format = LogFormat::Json;
    }
    gt_telemetry::logging::init_from_config("geotrack", &config.general);
    match &env_file {
        Ok(path) => info!(path = %path.display(), "loaded environment file"),
        Err(e) => debug!(error = %e, "no environment file loaded"),
    }

    info!(version = env!("CARGO_PKG_VERSION"), pid = std::process::id(), "geotrack daemon starting");

    let provider = Arc::new(SimulatedProvider::new(config.simulation.clone()));
    let daemon = Daemon::new(config, provider).context("failed to initialise daemon")?;
    let control = daemon.control();
    let signals = daemon.signal_sender();

    let listener = tokio::spawn(log_fixes(control.attach_listener()));

    if cli.boot {
        signals
            .send_async(HostSignal::BootCompleted)
            .await
            .context("failed to queue boot signal")?;
    }
    if cli.start && !control.start_service_manual().await {
        warn!("manual start on launch failed");
    }

    // Ctrl-c is a host teardown, not a user stop: auto-restart stays armed
    // in the persisted intent for the next launch.
    let shutdown = daemon.shutdown_handle();
    let teardown_control = control.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, tearing down");
        if !teardown_control.stop_service(false).await {
            warn!("teardown did not persist, tracking intent unchanged");
        }
        shutdown.trigger();
    });

    if let Err(e) = daemon.run().await {
        error!(error = %e, "daemon execution failed");
        return Err(e);
    }

    listener.abort();
    info!("geotrack daemon exited");
    Ok(())
}

fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    match explicit.or_else(environment::config_path_override) {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::load().context("failed to load config"),
    }
}

/// Print every fix record as a JSON line until the stream ends.
async fn log_fixes(subscription: FixSubscription) {
    while let Ok(event) = subscription.events.recv_async().await {
        match event {
            StreamEvent::Fix(record) => match serde_json::to_string(&record) {
                Ok(line) => info!(listener_id = %subscription.id, fix = %line, "fix received"),
                Err(e) => warn!(error = %e, "failed to encode fix record"),
            },
            StreamEvent::End => {
                info!(listener_id = %subscription.id, "fix stream ended");
                break;
            }
        }
    }
}
